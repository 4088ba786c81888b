use std::fmt;

use thiserror::Error;

const SOLAR_MASS_KG: f64 = 1.988_41e30;
const PARSEC_M: f64 = 3.085_677_581_491_367e16;
const JULIAN_YEAR_S: f64 = 3.155_76e7;

// Exponents of (mass, length, time, temperature).
type Dimensions = [i32; 4];

const DIMENSIONLESS: Dimensions = [0, 0, 0, 0];
const MASS: Dimensions = [1, 0, 0, 0];
const LENGTH: Dimensions = [0, 1, 0, 0];
const TIME: Dimensions = [0, 0, 1, 0];
const TEMPERATURE: Dimensions = [0, 0, 0, 1];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("unknown unit `{symbol}` in `{expr}`")]
    UnknownSymbol { symbol: String, expr: String },
    #[error("malformed unit expression `{0}`")]
    Malformed(String),
    #[error("cannot convert from `{from}` to `{to}`")]
    Incompatible { from: String, to: String },
}

fn lookup_symbol(symbol: &str) -> Option<(f64, Dimensions)> {
    let entry = match symbol {
        "g" => (1e-3, MASS),
        "kg" => (1.0, MASS),
        "Msun" | "msun" | "Solar_Mass" => (SOLAR_MASS_KG, MASS),
        "cm" => (1e-2, LENGTH),
        "m" => (1.0, LENGTH),
        "km" => (1e3, LENGTH),
        "pc" => (PARSEC_M, LENGTH),
        "kpc" => (1e3 * PARSEC_M, LENGTH),
        "Mpc" => (1e6 * PARSEC_M, LENGTH),
        "Gpc" => (1e9 * PARSEC_M, LENGTH),
        "s" => (1.0, TIME),
        "yr" => (JULIAN_YEAR_S, TIME),
        "Myr" => (1e6 * JULIAN_YEAR_S, TIME),
        "Gyr" => (1e9 * JULIAN_YEAR_S, TIME),
        "K" => (1.0, TEMPERATURE),
        _ => return None,
    };
    Some(entry)
}

/// A physical unit: a scale factor to SI base units plus a dimension vector.
///
/// The original expression is kept for display, so `Unit::parse("Mpc**3")`
/// prints as `Mpc**3` rather than a canonicalised form.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    expr: String,
    scale: f64,
    dims: Dimensions,
}

impl Unit {
    pub fn dimensionless() -> Self {
        Self {
            expr: "dimensionless".to_string(),
            scale: 1.0,
            dims: DIMENSIONLESS,
        }
    }

    /// Parse an expression such as `Solar_Mass`, `km/s`, `Mpc**3` or `1 / Mpc**3`.
    ///
    /// Factors are separated by `*` and `/` and evaluated left to right; each
    /// may carry an integer power written `**n` or `^n`.
    pub fn parse(expr: &str) -> Result<Self, UnitError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() || trimmed == "dimensionless" {
            return Ok(Self::dimensionless());
        }

        let normalised = trimmed.replace("**", "^");
        let mut scale = 1.0;
        let mut dims = DIMENSIONLESS;
        let mut sign = 1;
        let mut rest = normalised.as_str();
        loop {
            let split = rest.find(['*', '/']);
            let factor = match split {
                Some(idx) => &rest[..idx],
                None => rest,
            };
            apply_factor(factor.trim(), sign, &mut scale, &mut dims, trimmed)?;
            match split {
                Some(idx) => {
                    sign = if rest.as_bytes()[idx] == b'/' { -1 } else { 1 };
                    rest = &rest[idx + 1..];
                }
                None => break,
            }
        }

        Ok(Self {
            expr: trimmed.to_string(),
            scale,
            dims,
        })
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims == DIMENSIONLESS
    }

    /// Multiplicative factor taking a value in `self` to a value in `to`.
    pub fn conversion_factor(&self, to: &Unit) -> Result<f64, UnitError> {
        if self.dims != to.dims {
            return Err(UnitError::Incompatible {
                from: self.expr.clone(),
                to: to.expr.clone(),
            });
        }
        Ok(self.scale / to.scale)
    }

    /// The inverse unit, spelled so that [`Unit::parse`] reads it back:
    /// `Mpc**3` becomes `1 / Mpc**3` and `km/s` becomes `1 / km * s`.
    pub fn reciprocal(&self) -> Self {
        let expr = if self.is_dimensionless() && self.scale == 1.0 {
            self.expr.clone()
        } else {
            let mut text = String::from("1");
            for (op, factor) in split_factors(&self.expr) {
                let flipped = if op == '/' { '*' } else { '/' };
                text.push_str(&format!(" {flipped} {factor}"));
            }
            text
        };
        Self {
            expr,
            scale: 1.0 / self.scale,
            dims: self.dims.map(|d| -d),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

// Factors of an expression with the operator preceding each; `**` stays
// inside its factor.
fn split_factors(expr: &str) -> Vec<(char, &str)> {
    let bytes = expr.as_bytes();
    let mut factors = Vec::new();
    let mut op = '*';
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' if bytes.get(i + 1) == Some(&b'*') => i += 2,
            b'*' | b'/' => {
                factors.push((op, expr[start..i].trim()));
                op = bytes[i] as char;
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    factors.push((op, expr[start..].trim()));
    factors
}

fn apply_factor(
    factor: &str,
    sign: i32,
    scale: &mut f64,
    dims: &mut Dimensions,
    expr: &str,
) -> Result<(), UnitError> {
    if factor.is_empty() {
        return Err(UnitError::Malformed(expr.to_string()));
    }
    let (base, power) = match factor.split_once('^') {
        Some((base, power)) => {
            let power: i32 = power
                .trim()
                .parse()
                .map_err(|_| UnitError::Malformed(expr.to_string()))?;
            (base.trim(), power)
        }
        None => (factor, 1),
    };
    let power = sign * power;

    if let Ok(number) = base.parse::<f64>() {
        *scale *= number.powi(power);
        return Ok(());
    }

    let (factor_scale, factor_dims) =
        lookup_symbol(base).ok_or_else(|| UnitError::UnknownSymbol {
            symbol: base.to_string(),
            expr: expr.to_string(),
        })?;
    *scale *= factor_scale.powi(power);
    for (dim, unit_dim) in dims.iter_mut().zip(factor_dims) {
        *dim += unit_dim * power;
    }
    Ok(())
}

/// A value tagged with its unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn to(&self, unit: &Unit) -> Result<Quantity, UnitError> {
        let factor = self.unit.conversion_factor(unit)?;
        Ok(Quantity::new(self.value * factor, unit.clone()))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_dimensionless() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}
