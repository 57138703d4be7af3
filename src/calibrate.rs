//! Raw to engineering unit conversion.
use serde::{Deserialize, Serialize};

use crate::criteria::{all_match, MatchCriteria};
use crate::record::Record;
use crate::value::Value;
use crate::{Error, Result};

/// A single `coefficient * x^exponent` term.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub coefficient: f64,
    pub exponent: i32,
}

/// Power series over the raw value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Polynomial {
    pub terms: Vec<Term>,
}

impl Polynomial {
    /// Create from `(coefficient, exponent)` pairs.
    #[must_use]
    pub fn new(terms: &[(f64, i32)]) -> Self {
        Polynomial {
            terms: terms
                .iter()
                .map(|(coefficient, exponent)| Term {
                    coefficient: *coefficient,
                    exponent: *exponent,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        self.terms
            .iter()
            .map(|t| t.coefficient * x.powi(t.exponent))
            .sum()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SplinePoint {
    pub raw: f64,
    pub calibrated: f64,
}

/// Piecewise calibration over a set of points.
///
/// Only zero (step) and first (linear) order splines are supported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Spline {
    order: u8,
    extrapolate: bool,
    points: Vec<SplinePoint>,
}

impl Spline {
    /// Create a spline from `(raw, calibrated)` pairs. Points are sorted by raw value.
    ///
    /// # Errors
    /// [Error::Unsupported] for `order > 1`, [Error::InvalidSchema] if there are no points or
    /// a first order spline has fewer than 2 points.
    pub fn new(order: u8, extrapolate: bool, points: &[(f64, f64)]) -> Result<Self> {
        if order > 1 {
            return Err(Error::Unsupported(format!(
                "spline calibrators of order {order}"
            )));
        }
        if points.is_empty() || (order == 1 && points.len() < 2) {
            return Err(Error::InvalidSchema(format!(
                "order {order} spline with {} points",
                points.len()
            )));
        }
        let mut points: Vec<SplinePoint> = points
            .iter()
            .map(|(raw, calibrated)| SplinePoint {
                raw: *raw,
                calibrated: *calibrated,
            })
            .collect();
        points.sort_by(|a, b| a.raw.total_cmp(&b.raw));
        Ok(Spline {
            order,
            extrapolate,
            points,
        })
    }

    #[must_use]
    pub fn order(&self) -> u8 {
        self.order
    }

    #[must_use]
    pub fn extrapolate(&self) -> bool {
        self.extrapolate
    }

    #[must_use]
    pub fn points(&self) -> &[SplinePoint] {
        &self.points
    }

    /// # Errors
    /// [Error::CalibrationRange] if `x` is outside of the spline points and extrapolation
    /// is disabled.
    pub fn evaluate(&self, x: f64) -> Result<f64> {
        // constructor guarantees at least one point
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(Error::InvalidSchema("spline has no points".to_string())),
        };
        if (x < first.raw || x > last.raw) && !self.extrapolate {
            return Err(Error::CalibrationRange {
                query: x,
                min: first.raw,
                max: last.raw,
            });
        }
        match self.order {
            0 => Ok(self.step(x, first)),
            _ => Ok(self.linear(x)),
        }
    }

    fn step(&self, x: f64, first: SplinePoint) -> f64 {
        // last point at or below x; below the range that is the first point
        self.points
            .iter()
            .rev()
            .find(|p| p.raw <= x)
            .unwrap_or(&first)
            .calibrated
    }

    fn linear(&self, x: f64) -> f64 {
        let n = self.points.len();
        // index of the segment's upper point, clamped to the end segments for
        // extrapolation
        let upper = self
            .points
            .iter()
            .position(|p| p.raw > x)
            .unwrap_or(n - 1)
            .clamp(1, n - 1);
        let (p0, p1) = (self.points[upper - 1], self.points[upper]);
        if p1.raw == p0.raw {
            return p0.calibrated;
        }
        let slope = (p1.calibrated - p0.calibrated) / (p1.raw - p0.raw);
        slope * (x - p0.raw) + p0.calibrated
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Calibrator {
    Polynomial(Polynomial),
    Spline(Spline),
    /// Math operation calibrators can be described but not evaluated.
    MathOperation,
}

impl Calibrator {
    /// # Errors
    /// [Error::CalibrationRange] from splines, [Error::Unsupported] for math operations.
    pub fn calibrate(&self, x: f64) -> Result<f64> {
        match self {
            Calibrator::Polynomial(p) => Ok(p.evaluate(x)),
            Calibrator::Spline(s) => s.evaluate(x),
            Calibrator::MathOperation => Err(Error::Unsupported(
                "math operation calibrators".to_string(),
            )),
        }
    }
}

impl From<Polynomial> for Calibrator {
    fn from(p: Polynomial) -> Self {
        Calibrator::Polynomial(p)
    }
}

impl From<Spline> for Calibrator {
    fn from(s: Spline) -> Self {
        Calibrator::Spline(s)
    }
}

/// A calibrator that only applies when all of its criteria match.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContextCalibrator {
    pub criteria: Vec<MatchCriteria>,
    pub calibrator: Calibrator,
}

/// Calibrators attached to a numeric encoding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Calibration {
    pub default: Option<Calibrator>,
    pub context: Vec<ContextCalibrator>,
}

impl Calibration {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.context.is_empty()
    }

    /// Select the calibrator for `raw`: the first context calibrator whose criteria all
    /// match, else the default.
    ///
    /// `raw` is given to the criteria as the self-referential candidate.
    ///
    /// # Errors
    /// Any error evaluating context criteria.
    pub fn select(&self, raw: &Value, record: &Record) -> Result<Option<&Calibrator>> {
        self.select_with_default(raw, record, self.default.as_ref())
    }

    fn select_with_default<'a>(
        &'a self,
        raw: &Value,
        record: &Record,
        default: Option<&'a Calibrator>,
    ) -> Result<Option<&'a Calibrator>> {
        for ctx in &self.context {
            if all_match(&ctx.criteria, record, Some(raw))? {
                return Ok(Some(&ctx.calibrator));
            }
        }
        Ok(default)
    }

    /// Compute the derived value for `raw`, or `raw` itself if no calibrator applies.
    ///
    /// # Errors
    /// See [Calibration::select] and [Calibrator::calibrate].
    pub fn apply(&self, raw: &Value, record: &Record) -> Result<Value> {
        self.apply_with_default(raw, record, self.default.as_ref())
    }

    /// Like [Calibration::apply], with `default` in place of the default calibrator.
    ///
    /// # Errors
    /// See [Calibration::apply].
    pub fn apply_with_default(
        &self,
        raw: &Value,
        record: &Record,
        default: Option<&Calibrator>,
    ) -> Result<Value> {
        match self.select_with_default(raw, record, default)? {
            Some(cal) => {
                let x = raw.as_f64().ok_or_else(|| {
                    Error::Unsupported(format!("calibration of {} values", raw.type_name()))
                })?;
                Ok(Value::Float(cal.calibrate(x)?))
            }
            None => Ok(raw.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Comparison, Operator};
    use test_case::test_case;

    #[test]
    fn polynomial() {
        let p = Polynomial::new(&[(1.0, 0), (2.0, 1)]);
        assert_eq!(p.evaluate(3.0), 7.0);
    }

    #[test_case(5.0, Some(0.0); "within")]
    #[test_case(10.0, Some(10.0); "on point")]
    #[test_case(20.0, Some(20.0); "upper bound")]
    #[test_case(25.0, None; "above")]
    #[test_case(-1.0, None; "below")]
    fn zero_order_no_extrapolation(x: f64, expected: Option<f64>) {
        let s = Spline::new(0, false, &[(10.0, 10.0), (0.0, 0.0), (20.0, 20.0)]).unwrap();
        match expected {
            Some(want) => assert_eq!(s.evaluate(x).unwrap(), want),
            None => assert!(matches!(
                s.evaluate(x),
                Err(Error::CalibrationRange { min, max, .. }) if min == 0.0 && max == 20.0
            )),
        }
    }

    #[test]
    fn zero_order_extrapolation() {
        let s = Spline::new(0, true, &[(0.0, 0.0), (10.0, 10.0), (20.0, 20.0)]).unwrap();
        assert_eq!(s.evaluate(25.0).unwrap(), 20.0);
        assert_eq!(s.evaluate(-5.0).unwrap(), 0.0);
    }

    #[test_case(5.0, 10.0; "interpolate")]
    #[test_case(15.0, 40.0; "second segment")]
    #[test_case(20.0, 60.0; "upper bound")]
    #[test_case(30.0, 100.0; "extrapolate above")]
    #[test_case(-10.0, -20.0; "extrapolate below")]
    fn first_order(x: f64, expected: f64) {
        let s = Spline::new(1, true, &[(0.0, 0.0), (10.0, 20.0), (20.0, 60.0)]).unwrap();
        assert!((s.evaluate(x).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn higher_order_unsupported() {
        assert!(matches!(
            Spline::new(2, false, &[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn math_operation_unsupported() {
        assert!(matches!(
            Calibrator::MathOperation.calibrate(1.0),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn context_selection() {
        let cal = Calibration {
            default: Some(Polynomial::new(&[(1.0, 1)]).into()),
            context: vec![
                ContextCalibrator {
                    criteria: vec![Comparison::new("SELF", Operator::Ge, "100").raw().into()],
                    calibrator: Polynomial::new(&[(0.0, 0), (10.0, 1)]).into(),
                },
                ContextCalibrator {
                    criteria: vec![Comparison::new("SELF", Operator::Ge, "50").raw().into()],
                    calibrator: Polynomial::new(&[(-1.0, 0)]).into(),
                },
            ],
        };
        let rec = Record::new();
        // first match wins even though the second also matches
        assert_eq!(
            cal.apply(&Value::Integer(200), &rec).unwrap(),
            Value::Float(2000.0)
        );
        assert_eq!(
            cal.apply(&Value::Integer(60), &rec).unwrap(),
            Value::Float(-1.0)
        );
        assert_eq!(
            cal.apply(&Value::Integer(3), &rec).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            Calibration::default()
                .apply(&Value::Integer(3), &rec)
                .unwrap(),
            Value::Integer(3)
        );
    }
}
