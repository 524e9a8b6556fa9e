// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Dotted three-level names (`bank`, `bank.register`, `bank.register.field`)
//! and the array grammar used to declare repeated registers and fields.
//!
//! A segment is an identifier `[A-Za-z][A-Za-z0-9_]*` followed by zero or more
//! dimensions, each written `[size]` or `[size stride s]`. The first bracket is
//! the outermost dimension. Concrete element names (`r[0]`) reuse the same
//! syntax with the bracket holding an index.

use crate::{BankError, BankResult};
use std::fmt;

pub const SEPARATOR: char = '.';

const MAX_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Bank,
    Register,
    Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dimension {
    size: u64,
    stride: Option<u64>,
}

/// True iff every segment is a valid identifier (with optional dimensions)
/// and there are at most three segments.
pub fn validate(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let segments: Vec<&str> = name.split(SEPARATOR).collect();
    segments.len() <= MAX_DEPTH && segments.iter().all(|s| valid_segment(s))
}

/// Hierarchy level of `name`, from the number of separators it contains.
pub fn level(name: &str) -> BankResult<Level> {
    match name.matches(SEPARATOR).count() {
        0 => Ok(Level::Bank),
        1 => Ok(Level::Register),
        2 => Ok(Level::Field),
        _ => Err(BankError::InvalidName(name.to_string())),
    }
}

pub fn is_array(name: &str) -> bool {
    name.contains('[')
}

/// The part of `name` in front of its first dimension.
pub fn array_base(name: &str) -> &str {
    match name.find('[') {
        Some(i) => &name[..i],
        None => name,
    }
}

/// Expands an array name into its concrete element names and their offsets.
///
/// Elements are returned in row-major order. The innermost dimension strides
/// by `element_width` unless told otherwise; an outer dimension without an
/// explicit stride spans the whole inner dimension. A name without
/// dimensions expands to itself at offset 0.
///
/// Declarations with more than `max_elements` elements are rejected before
/// anything is allocated.
pub fn expand_array(
    name: &str,
    element_width: u64,
    max_elements: u64,
) -> BankResult<Vec<(String, u64)>> {
    let Some(open) = name.find('[') else {
        return Ok(vec![(name.to_string(), 0)]);
    };
    let (base, suffix) = name.split_at(open);
    let malformed = || BankError::MalformedArraySpec(name.to_string());

    let dims = parse_dimensions(suffix).ok_or_else(malformed)?;
    if dims.iter().any(|d| d.size == 0) {
        return Err(malformed());
    }
    let count = dims
        .iter()
        .try_fold(1u64, |n, d| n.checked_mul(d.size))
        .filter(|n| *n <= max_elements)
        .ok_or_else(|| BankError::ArrayTooLarge {
            name: name.to_string(),
            limit: max_elements,
        })?;

    let mut strides = vec![0u64; dims.len()];
    let mut next = element_width;
    for (i, dim) in dims.iter().enumerate().rev() {
        let stride = dim.stride.unwrap_or(next);
        strides[i] = stride;
        next = dim.size.checked_mul(stride).ok_or_else(malformed)?;
    }

    let mut elements = Vec::with_capacity(count as usize);
    let mut index = vec![0u64; dims.len()];
    loop {
        let mut concrete = base.to_string();
        let mut offset = 0u64;
        for (i, stride) in index.iter().zip(&strides) {
            concrete.push_str(&format!("[{}]", i));
            offset = i
                .checked_mul(*stride)
                .and_then(|o| o.checked_add(offset))
                .ok_or_else(malformed)?;
        }
        elements.push((concrete, offset));

        let mut d = dims.len();
        loop {
            if d == 0 {
                return Ok(elements);
            }
            d -= 1;
            index[d] += 1;
            if index[d] < dims[d].size {
                break;
            }
            index[d] = 0;
        }
    }
}

fn valid_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn valid_segment(segment: &str) -> bool {
    let ident = array_base(segment);
    valid_identifier(ident) && parse_dimensions(&segment[ident.len()..]).is_some()
}

fn parse_dimensions(mut rest: &str) -> Option<Vec<Dimension>> {
    let mut dims = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        let body = &inner[..close];
        if body.contains('[') {
            return None;
        }
        dims.push(parse_dimension(body)?);
        rest = &inner[close + 1..];
    }
    Some(dims)
}

fn parse_dimension(body: &str) -> Option<Dimension> {
    let tokens: Vec<&str> = body.split_whitespace().collect();
    let size = match tokens.as_slice() {
        [size] | [size, "stride", _] => size.parse::<u64>().ok()?,
        _ => return None,
    };
    let stride = match tokens.as_slice() {
        [_, _, stride] => Some(stride.parse::<u64>().ok()?),
        _ => None,
    };
    Some(Dimension { size, stride })
}

/// A validated name with a known hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HierarchicalName {
    full: String,
    level: Level,
}

impl HierarchicalName {
    /// Builds a name that must sit at `expected` level.
    ///
    /// # Panics
    ///
    /// Panics if `name` is malformed or names an object at a different level.
    /// Callers validate user input first; reaching this is a programming error.
    pub fn new(name: impl Into<String>, expected: Level) -> Self {
        let full = name.into();
        assert!(validate(&full), "invalid hierarchical name '{}'", full);
        let actual = match level(&full) {
            Ok(level) => level,
            Err(e) => panic!("{}", e),
        };
        assert_eq!(
            actual, expected,
            "'{}' names a {:?}, expected a {:?}",
            full, actual, expected
        );
        Self {
            full,
            level: actual,
        }
    }

    /// Validates `name` and derives its level.
    pub fn parse(name: &str) -> BankResult<Self> {
        if name.is_empty() {
            return Err(BankError::EmptyName);
        }
        if !validate(name) {
            return Err(BankError::InvalidName(name.to_string()));
        }
        Ok(Self {
            full: name.to_string(),
            level: level(name)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Last segment.
    pub fn leaf(&self) -> &str {
        self.full
            .rsplit(SEPARATOR)
            .next()
            .unwrap_or(self.full.as_str())
    }

    pub fn bank_name(&self) -> &str {
        self.full.split(SEPARATOR).next().unwrap_or(self.full.as_str())
    }

    /// Register segment, for register and field level names.
    pub fn register_name(&self) -> Option<&str> {
        self.full.split(SEPARATOR).nth(1)
    }

    /// Field segment, for field level names.
    pub fn field_name(&self) -> Option<&str> {
        self.full.split(SEPARATOR).nth(2)
    }

    /// Appends `leaf` one level down.
    pub fn child(&self, leaf: &str) -> BankResult<Self> {
        Self::parse(&format!("{}{}{}", self.full, SEPARATOR, leaf))
    }
}

impl fmt::Display for HierarchicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}
