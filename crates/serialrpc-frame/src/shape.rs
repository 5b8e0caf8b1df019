//! Shape tags and the values they carry.
//!
//! The protocol supports a closed set of call signatures:
//! `void f()`, `int f(int, int)`, `float f(float)` and `String f(String)`.
//! Results additionally use the single-int shape for `int` returns.

use std::fmt;

/// No value.
pub const TAG_VOID: char = 'V';
/// Single integer (results only).
pub const TAG_INT: char = 'I';
/// Two integers (commands only).
pub const TAG_INT_PAIR: char = 'H';
/// Text.
pub const TAG_STRING: char = 'S';
/// Single-precision float.
pub const TAG_FLOAT: char = 'F';

/// Argument or value shape of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shape {
    Void,
    Int,
    IntPair,
    Str,
    Float,
}

impl Shape {
    /// Wire tag for this shape.
    pub fn tag(self) -> char {
        match self {
            Shape::Void => TAG_VOID,
            Shape::Int => TAG_INT,
            Shape::IntPair => TAG_INT_PAIR,
            Shape::Str => TAG_STRING,
            Shape::Float => TAG_FLOAT,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            TAG_VOID => Some(Shape::Void),
            TAG_INT => Some(Shape::Int),
            TAG_INT_PAIR => Some(Shape::IntPair),
            TAG_STRING => Some(Shape::Str),
            TAG_FLOAT => Some(Shape::Float),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Shape::Void => "void",
            Shape::Int => "int",
            Shape::IntPair => "int-pair",
            Shape::Str => "string",
            Shape::Float => "float",
        }
    }

    /// Whether a command may carry arguments of this shape.
    pub fn is_argument_shape(self) -> bool {
        !matches!(self, Shape::Int)
    }

    /// Whether a result may carry a value of this shape.
    pub fn is_result_shape(self) -> bool {
        !matches!(self, Shape::IntPair)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    Void,
    IntPair(i32, i32),
    Str(String),
    Float(f32),
}

impl Args {
    pub fn shape(&self) -> Shape {
        match self {
            Args::Void => Shape::Void,
            Args::IntPair(..) => Shape::IntPair,
            Args::Str(_) => Shape::Str,
            Args::Float(_) => Shape::Float,
        }
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Args::Void => Ok(()),
            Args::IntPair(a, b) => write!(f, "{a},{b}"),
            Args::Str(s) => f.write_str(s),
            Args::Float(v) => write!(f, "{v}"),
        }
    }
}

/// A result value. `Void` is the explicit "no value" marker of a `V` result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Int(i32),
    Str(String),
    Float(f32),
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::Void => Shape::Void,
            Value::Int(_) => Shape::Int,
            Value::Str(_) => Shape::Str,
            Value::Float(_) => Shape::Float,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}
