//! User-tunable kernel uniforms
//!
//! Kernels declare their tunable parameters inside a tagged region. Each
//! parameter takes two lines: a parameter comment followed by a `vec4`
//! declaration.
//!
//! ```text
//! // BEGIN_USER_UNIFS
//!     // comps 1 min 0 max 1 speed 0.01 def 0.25
//!     diffusion: vec4<f32>,
//!     // comps 3
//!     vec4 tint;
//! // END_USER_UNIFS
//! ```
//!
//! Parameter fields appear in the fixed order `comps min max speed def`,
//! and any suffix of them may be omitted. The declaration may be written as a
//! WGSL struct member (`name: vec4<f32>,`) or GLSL-style (`vec4 name;`).
//!
//! The parsed list order is the order values are packed for the kernel, see
//! [`UniformMarshaler`].

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::nodes::Vec4;

/// Capacity of the packed uniform array consumed by kernels
pub const MAX_USER_UNIFORMS: usize = 100;

/// Tag opening the user uniform region
pub const BEGIN_USER_UNIFS: &str = "// BEGIN_USER_UNIFS";

/// Tag closing the user uniform region
pub const END_USER_UNIFS: &str = "// END_USER_UNIFS";

/// Packed uniform values in declaration order
pub type PackedUniforms = [Vec4; MAX_USER_UNIFORMS];

/// A named, bounded, tunable kernel parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUniform {
    pub name: String,
    /// Number of meaningful components (1-4)
    pub num_comps: u32,
    pub default_val: Vec4,
    pub current_val: Vec4,
    pub min_val: f32,
    pub max_val: f32,
    /// Step size for interactive editing
    pub drag_speed: f32,
}

impl UserUniform {
    /// Create a uniform whose current value starts at its default
    pub fn new(
        name: impl Into<String>,
        num_comps: u32,
        default_val: Vec4,
        min_val: f32,
        max_val: f32,
        drag_speed: f32,
    ) -> Self {
        Self {
            name: name.into(),
            num_comps,
            default_val,
            current_val: default_val,
            min_val,
            max_val,
            drag_speed,
        }
    }

    /// Restore the current value to the default
    pub fn reset(&mut self) {
        self.current_val = self.default_val;
    }

    /// Set the current value, clamping each component to `[min, max]`
    pub fn set(&mut self, value: Vec4) {
        let (lo, hi) = (self.min_val.min(self.max_val), self.max_val.max(self.min_val));
        self.current_val = value.map(|c| c.clamp(lo, hi));
    }
}

/// Packs uniform lists into the fixed-capacity array consumed by kernels
///
/// Slots past the end of the packed list keep whatever a previous pack left
/// there; kernels only read the slots they declare.
#[derive(Debug, Clone)]
pub struct UniformMarshaler {
    values: PackedUniforms,
}

impl Default for UniformMarshaler {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformMarshaler {
    pub fn new() -> Self {
        Self {
            values: [[0.0; 4]; MAX_USER_UNIFORMS],
        }
    }

    /// Copy each uniform's current value into the slot matching its position
    pub fn pack(&mut self, uniforms: &[UserUniform]) -> EngineResult<&PackedUniforms> {
        check_uniform_count(uniforms)?;
        for (slot, uniform) in self.values.iter_mut().zip(uniforms) {
            *slot = uniform.current_val;
        }
        Ok(&self.values)
    }

    /// The most recently packed values
    pub fn values(&self) -> &PackedUniforms {
        &self.values
    }
}

/// Reject uniform lists that do not fit the packed array
pub fn check_uniform_count(uniforms: &[UserUniform]) -> EngineResult<()> {
    if uniforms.len() >= MAX_USER_UNIFORMS {
        return Err(EngineError::TooManyUniforms {
            count: uniforms.len(),
            max: MAX_USER_UNIFORMS,
        });
    }
    Ok(())
}

/// Parse the user uniform region of a kernel's source text
///
/// Text without a region yields an empty list. A region that is never closed
/// ends at the end of the text.
pub fn parse_user_uniforms(text: &str) -> EngineResult<Vec<UserUniform>> {
    let mut uniforms = Vec::new();
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .skip_while(|(_, line)| !line.starts_with(BEGIN_USER_UNIFS));

    if lines.next().is_none() {
        return Ok(uniforms);
    }

    let mut lines = lines.filter(|(_, line)| !line.is_empty());
    while let Some((line_no, field_line)) = lines.next() {
        if field_line.starts_with(END_USER_UNIFS) {
            break;
        }
        let parsed = parse_field_comment(line_no, field_line)?;

        let (decl_no, decl_line) = lines.next().ok_or_else(|| EngineError::UniformParse {
            line: line_no,
            reason: "parameter comment is not followed by a declaration".to_string(),
        })?;
        let name = parse_declaration(decl_no, decl_line)?;

        uniforms.push(UserUniform::new(
            name,
            parsed.num_comps,
            parsed.default_val,
            parsed.min_val,
            parsed.max_val,
            parsed.drag_speed,
        ));
    }
    Ok(uniforms)
}

struct UniformFields {
    num_comps: u32,
    min_val: f32,
    max_val: f32,
    drag_speed: f32,
    default_val: Vec4,
}

impl Default for UniformFields {
    fn default() -> Self {
        Self {
            num_comps: 4,
            min_val: 0.0,
            max_val: 1.0,
            drag_speed: 1.0,
            default_val: [0.0; 4],
        }
    }
}

const FIELD_NAMES: [&str; 5] = ["comps", "min", "max", "speed", "def"];

fn parse_field_comment(line: usize, text: &str) -> EngineResult<UniformFields> {
    let parse_err = |reason: String| EngineError::UniformParse { line, reason };

    let body = text
        .strip_prefix("//")
        .ok_or_else(|| parse_err(format!("expected a parameter comment, found `{text}`")))?;

    let mut parsed = UniformFields::default();
    let mut tokens = body.split_whitespace().peekable();
    let mut fields = FIELD_NAMES.iter();

    while let Some(keyword) = tokens.next() {
        // Fields may only be omitted as a suffix, so the next keyword must be
        // the next field in order.
        let expected = fields
            .next()
            .ok_or_else(|| parse_err(format!("unexpected trailing token `{keyword}`")))?;
        if keyword != *expected {
            return Err(parse_err(format!(
                "expected field `{expected}`, found `{keyword}`"
            )));
        }

        if keyword == "def" {
            let mut count = 0;
            while let Some(token) = tokens.peek() {
                if count == 4 {
                    return Err(parse_err(format!("unexpected trailing token `{token}`")));
                }
                parsed.default_val[count] = parse_float(token).map_err(parse_err)?;
                tokens.next();
                count += 1;
            }
            if count == 0 {
                return Err(parse_err("field `def` needs at least one value".to_string()));
            }
            continue;
        }

        let value = tokens
            .next()
            .ok_or_else(|| parse_err(format!("field `{keyword}` is missing its value")))?;
        match keyword {
            "comps" => {
                let comps: u32 = value
                    .parse()
                    .map_err(|_| parse_err(format!("`{value}` is not a component count")))?;
                if !(1..=4).contains(&comps) {
                    return Err(parse_err(format!("component count {comps} is not in 1..=4")));
                }
                parsed.num_comps = comps;
            }
            "min" => parsed.min_val = parse_float(value).map_err(parse_err)?,
            "max" => parsed.max_val = parse_float(value).map_err(parse_err)?,
            // `speed`, the only field left once `def` is handled above
            _ => parsed.drag_speed = parse_float(value).map_err(parse_err)?,
        }
    }
    Ok(parsed)
}

fn parse_float(token: &str) -> Result<f32, String> {
    token
        .parse::<f32>()
        .map_err(|_| format!("`{token}` is not a number"))
}

/// Extract the variable name from a `vec4` declaration line
fn parse_declaration(line: usize, text: &str) -> EngineResult<String> {
    let parse_err = |reason: String| EngineError::UniformParse { line, reason };

    let name = if let Some(rest) = text.strip_prefix("vec4") {
        // GLSL: `vec4 name;`
        if !rest.starts_with(char::is_whitespace) {
            return Err(parse_err(format!("expected a vec4 declaration, found `{text}`")));
        }
        rest.trim()
            .strip_suffix(';')
            .ok_or_else(|| parse_err(format!("declaration `{text}` is missing `;`")))?
            .trim()
    } else if let Some((name, ty)) = text.split_once(':') {
        // WGSL struct member: `name: vec4<f32>,`
        let ty = ty.trim();
        let ty = ty.strip_suffix(',').unwrap_or(ty).trim();
        if ty != "vec4<f32>" && ty != "vec4f" {
            return Err(parse_err(format!("uniform `{}` must be vec4<f32>, found `{ty}`", name.trim())));
        }
        name.trim()
    } else {
        return Err(parse_err(format!("expected a vec4 declaration, found `{text}`")));
    };

    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(parse_err(format!("`{name}` is not a valid uniform name")));
    }
    Ok(name.to_string())
}
