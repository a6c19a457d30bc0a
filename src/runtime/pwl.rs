use serde::{Deserialize, Serialize};

use crate::bytecode::ir::PiecewiseLinear;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};

/// What a piecewise-linear table returns outside its first and last
/// breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PwlExtrapolation {
    /// Extend the nearest end segment.
    #[default]
    Linear,
    /// Hold the nearest end value.
    Clamp,
    /// Fail with a domain error.
    Error,
}

/// Evaluates `table` at `x`.
///
/// Inside the table, `y = y_i + (x - x_i) * (y_{i+1} - y_i) / (x_{i+1} - x_i)`
/// on the bracketing segment; at a breakpoint the stored `y` is returned
/// exactly. A one-point table is constant.
pub fn evaluate(table: &PiecewiseLinear, x: f64, policy: PwlExtrapolation) -> Result<f64, RuntimeError> {
    if !x.is_finite() {
        return Err(RuntimeErrorKind::PwlDomain(format!("x = {} is not finite", x)).into());
    }

    let points = table.points();
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(RuntimeErrorKind::PwlDomain("empty table".to_string()).into()),
    };

    if points.len() == 1 {
        return Ok(first.1);
    }

    if x < first.0 || x > last.0 {
        let (a, b, edge) = if x < first.0 {
            (points[0], points[1], first)
        } else {
            (points[points.len() - 2], last, last)
        };
        return match policy {
            PwlExtrapolation::Linear => Ok(interpolate(a, b, x)),
            PwlExtrapolation::Clamp => Ok(edge.1),
            PwlExtrapolation::Error => Err(RuntimeErrorKind::PwlDomain(format!(
                "x = {} is outside [{}, {}]",
                x, first.0, last.0
            ))
            .into()),
        };
    }

    // first index whose x is greater than the argument; at least 1 here
    let upper = points.partition_point(|p| p.0 <= x);
    let lower = points[upper - 1];
    if lower.0 == x || upper == points.len() {
        return Ok(lower.1);
    }
    Ok(interpolate(lower, points[upper], x))
}

fn interpolate(a: (f64, f64), b: (f64, f64), x: f64) -> f64 {
    a.1 + (x - a.0) * (b.1 - a.1) / (b.0 - a.0)
}
