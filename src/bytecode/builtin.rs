use serde::{Deserialize, Serialize};

use crate::bytecode::cell::Opcode;

/// Fixed table of builtin math functions callable from config source.
///
/// Angles are radians except for the `*d` variants, which take or return
/// degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    // ─── One argument ───
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sind,
    Cosd,
    Tand,
    Asind,
    Acosd,
    Atand,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Nint,
    Sign,

    // ─── Two arguments ───
    Atan2,
    Atan2d,
    Max,
    Min,
}

impl Builtin {
    pub const ALL: [Builtin; 28] = [
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Asin,
        Builtin::Acos,
        Builtin::Atan,
        Builtin::Sind,
        Builtin::Cosd,
        Builtin::Tand,
        Builtin::Asind,
        Builtin::Acosd,
        Builtin::Atand,
        Builtin::Sinh,
        Builtin::Cosh,
        Builtin::Tanh,
        Builtin::Exp,
        Builtin::Ln,
        Builtin::Log10,
        Builtin::Sqrt,
        Builtin::Abs,
        Builtin::Floor,
        Builtin::Ceil,
        Builtin::Nint,
        Builtin::Sign,
        Builtin::Atan2,
        Builtin::Atan2d,
        Builtin::Max,
        Builtin::Min,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Asin => "asin",
            Builtin::Acos => "acos",
            Builtin::Atan => "atan",
            Builtin::Sind => "sind",
            Builtin::Cosd => "cosd",
            Builtin::Tand => "tand",
            Builtin::Asind => "asind",
            Builtin::Acosd => "acosd",
            Builtin::Atand => "atand",
            Builtin::Sinh => "sinh",
            Builtin::Cosh => "cosh",
            Builtin::Tanh => "tanh",
            Builtin::Exp => "exp",
            Builtin::Ln => "ln",
            Builtin::Log10 => "log10",
            Builtin::Sqrt => "sqrt",
            Builtin::Abs => "abs",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Nint => "nint",
            Builtin::Sign => "sign",
            Builtin::Atan2 => "atan2",
            Builtin::Atan2d => "atan2d",
            Builtin::Max => "max",
            Builtin::Min => "min",
        }
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Atan2 | Builtin::Atan2d | Builtin::Max | Builtin::Min => 2,
            _ => 1,
        }
    }

    /// Opcode emitted for a call to this builtin.
    ///
    /// `nint` and `sign` have dedicated opcodes; everything else goes
    /// through the generic one- or two-argument dispatch.
    pub fn opcode(self) -> Opcode {
        match self {
            Builtin::Nint => Opcode::Nint,
            Builtin::Sign => Opcode::Sign,
            b if b.arity() == 2 => Opcode::Builtin2(b),
            b => Opcode::Builtin1(b),
        }
    }

    /// Evaluates a one-argument builtin on a double.
    ///
    /// Returns a short reason when `x` is outside the function's domain or
    /// the result is not finite.
    pub fn apply1(self, x: f64) -> Result<f64, String> {
        let in_unit = |x: f64| (-1.0..=1.0).contains(&x);

        let y = match self {
            Builtin::Sin => x.sin(),
            Builtin::Cos => x.cos(),
            Builtin::Tan => x.tan(),
            Builtin::Asin | Builtin::Asind if !in_unit(x) => {
                return Err(format!("{}({}) is outside [-1, 1]", self.name(), x));
            }
            Builtin::Acos | Builtin::Acosd if !in_unit(x) => {
                return Err(format!("{}({}) is outside [-1, 1]", self.name(), x));
            }
            Builtin::Asin => x.asin(),
            Builtin::Acos => x.acos(),
            Builtin::Atan => x.atan(),
            Builtin::Sind => x.to_radians().sin(),
            Builtin::Cosd => x.to_radians().cos(),
            Builtin::Tand => x.to_radians().tan(),
            Builtin::Asind => x.asin().to_degrees(),
            Builtin::Acosd => x.acos().to_degrees(),
            Builtin::Atand => x.atan().to_degrees(),
            Builtin::Sinh => x.sinh(),
            Builtin::Cosh => x.cosh(),
            Builtin::Tanh => x.tanh(),
            Builtin::Exp => x.exp(),
            Builtin::Ln | Builtin::Log10 if x <= 0.0 => {
                return Err(format!("{}({}) of a non-positive number", self.name(), x));
            }
            Builtin::Ln => x.ln(),
            Builtin::Log10 => x.log10(),
            Builtin::Sqrt if x < 0.0 => {
                return Err(format!("sqrt({}) of a negative number", x));
            }
            Builtin::Sqrt => x.sqrt(),
            Builtin::Abs => x.abs(),
            Builtin::Floor => x.floor(),
            Builtin::Ceil => x.ceil(),
            Builtin::Nint => x.round(),
            Builtin::Sign => sign_f64(x),
            Builtin::Atan2 | Builtin::Atan2d | Builtin::Max | Builtin::Min => {
                return Err(format!("{} takes 2 arguments", self.name()));
            }
        };

        finite(self, y)
    }

    /// Evaluates a two-argument builtin on doubles.
    pub fn apply2(self, a: f64, b: f64) -> Result<f64, String> {
        let y = match self {
            Builtin::Atan2 => a.atan2(b),
            Builtin::Atan2d => a.atan2(b).to_degrees(),
            Builtin::Max => a.max(b),
            Builtin::Min => a.min(b),
            _ => return Err(format!("{} takes 1 argument", self.name())),
        };

        finite(self, y)
    }
}

fn sign_f64(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn finite(builtin: Builtin, y: f64) -> Result<f64, String> {
    if y.is_finite() {
        Ok(y)
    } else {
        Err(format!("{} produced a non-finite result", builtin.name()))
    }
}

impl std::fmt::Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_lookup_round_trips_every_name() {
        for b in Builtin::ALL {
            assert_eq!(Builtin::lookup(b.name()), Some(b));
        }
        assert_eq!(Builtin::lookup("pow"), None);
    }

    #[test]
    fn test_arity() {
        assert_eq!(Builtin::Sqrt.arity(), 1);
        assert_eq!(Builtin::Atan2d.arity(), 2);
        assert_eq!(Builtin::ALL.iter().filter(|b| b.arity() == 2).count(), 4);
    }

    #[test]
    fn test_dedicated_opcodes() {
        assert_eq!(Builtin::Nint.opcode(), Opcode::Nint);
        assert_eq!(Builtin::Sign.opcode(), Opcode::Sign);
        assert_eq!(Builtin::Cos.opcode(), Opcode::Builtin1(Builtin::Cos));
        assert_eq!(Builtin::Max.opcode(), Opcode::Builtin2(Builtin::Max));
    }

    #[test]
    fn test_degree_variants() {
        assert!(close(Builtin::Sind.apply1(30.0).unwrap(), 0.5));
        assert!(close(Builtin::Acosd.apply1(0.0).unwrap(), 90.0));
        assert!(close(Builtin::Atan2d.apply2(1.0, 1.0).unwrap(), 45.0));
    }

    #[test]
    fn test_domain_errors() {
        assert!(Builtin::Sqrt.apply1(-1.0).unwrap_err().contains("negative"));
        assert!(Builtin::Ln.apply1(0.0).is_err());
        assert!(Builtin::Asin.apply1(1.5).unwrap_err().contains("[-1, 1]"));
        assert!(Builtin::Exp.apply1(1000.0).unwrap_err().contains("non-finite"));
    }

    #[test]
    fn test_wrong_table_side() {
        assert!(Builtin::Max.apply1(1.0).is_err());
        assert!(Builtin::Sin.apply2(1.0, 2.0).is_err());
    }
}
