//! Conditions and aggregates over rows
//!
//! Conditional writes carry a [`Condition`]; reads may carry
//! [`AggregateSpec`]s. Comparisons are defined within one primitive type
//! only; comparing across types is a statement error, not a silent false.

use dockv_core::{ColumnId, Error, PrimitiveValue, Result, SubDocument};

use crate::row::Row;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

/// A condition attached to a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The row exists.
    Exists,
    /// The row does not exist.
    NotExists,
    /// Compare a column against a constant.
    Compare {
        /// Column to compare.
        column: ColumnId,
        /// Operator.
        op: CompareOp,
        /// Constant to compare against.
        value: PrimitiveValue,
    },
    /// All subconditions hold.
    And(Vec<Condition>),
    /// At least one subcondition holds.
    Or(Vec<Condition>),
    /// The subcondition does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// Columns a condition reads, for building the pre-image projection.
    pub fn referenced_columns(&self, out: &mut Vec<ColumnId>) {
        match self {
            Condition::Exists | Condition::NotExists => {}
            Condition::Compare { column, .. } => {
                if !out.contains(column) {
                    out.push(*column);
                }
            }
            Condition::And(cs) | Condition::Or(cs) => {
                for c in cs {
                    c.referenced_columns(out);
                }
            }
            Condition::Not(c) => c.referenced_columns(out),
        }
    }

    /// Evaluates against a row that may not exist.
    pub fn evaluate(&self, row: Option<&Row>) -> Result<bool> {
        match self {
            Condition::Exists => Ok(row.is_some()),
            Condition::NotExists => Ok(row.is_none()),
            Condition::Compare { column, op, value } => {
                let Some(row) = row else { return Ok(false) };
                let current = row.get(*column);
                compare(current, *op, value)
            }
            Condition::And(cs) => {
                for c in cs {
                    if !c.evaluate(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(cs) => {
                for c in cs {
                    if c.evaluate(row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(c) => Ok(!c.evaluate(row)?),
        }
    }
}

fn compare(current: Option<&SubDocument>, op: CompareOp, constant: &PrimitiveValue) -> Result<bool> {
    let current = match current {
        Some(SubDocument::Primitive(p)) => p,
        Some(other) => {
            return Err(Error::InvalidArgument(format!(
                "cannot compare container of kind {:?}",
                other.value_kind()
            )))
        }
        None => &PrimitiveValue::Null,
    };
    // Null never compares equal to a non-null constant but satisfies Ne.
    let ordering = match (current, constant) {
        (PrimitiveValue::Null, PrimitiveValue::Null) => Some(std::cmp::Ordering::Equal),
        (PrimitiveValue::Null, _) | (_, PrimitiveValue::Null) => None,
        (PrimitiveValue::Int64(a), PrimitiveValue::Int64(b)) => Some(a.cmp(b)),
        (PrimitiveValue::Double(a), PrimitiveValue::Double(b)) => a.partial_cmp(b),
        (PrimitiveValue::String(a), PrimitiveValue::String(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(Error::InvalidArgument(format!(
                "cannot compare {:?} with {:?}",
                a.kind(),
                b.kind()
            )))
        }
    };
    Ok(match ordering {
        None => matches!(op, CompareOp::Ne),
        Some(ord) => match op {
            CompareOp::Eq => ord.is_eq(),
            CompareOp::Ne => ord.is_ne(),
            CompareOp::Lt => ord.is_lt(),
            CompareOp::Le => ord.is_le(),
            CompareOp::Gt => ord.is_gt(),
            CompareOp::Ge => ord.is_ge(),
        },
    })
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    /// Row (or non-null value) count.
    Count,
    /// Numeric sum.
    Sum,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

/// One aggregate target: a function over a column, or over whole rows when
/// `column` is `None` (COUNT only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSpec {
    /// Function to apply.
    pub func: AggregateFn,
    /// Column the function folds over.
    pub column: Option<ColumnId>,
}

/// Running state of one aggregate.
#[derive(Debug, Clone)]
pub struct Accumulator {
    spec: AggregateSpec,
    state: Option<PrimitiveValue>,
    count: i64,
}

impl Accumulator {
    /// Fresh accumulator for a spec.
    pub fn new(spec: AggregateSpec) -> Self {
        Accumulator { spec, state: None, count: 0 }
    }

    /// Folds one row in.
    pub fn push(&mut self, row: &Row) -> Result<()> {
        let value = match self.spec.column {
            None => None,
            Some(id) => match row.get(id) {
                None | Some(SubDocument::Primitive(PrimitiveValue::Null)) => return Ok(()),
                Some(SubDocument::Primitive(p)) => Some(p.clone()),
                Some(other) => {
                    return Err(Error::InvalidArgument(format!(
                        "cannot aggregate container of kind {:?}",
                        other.value_kind()
                    )))
                }
            },
        };
        self.count += 1;
        let Some(value) = value else { return Ok(()) };
        match self.spec.func {
            AggregateFn::Count => {}
            AggregateFn::Sum => {
                self.state = Some(match (self.state.take(), value) {
                    (None, v) => v,
                    (Some(PrimitiveValue::Int64(a)), PrimitiveValue::Int64(b)) => {
                        match a.checked_add(b) {
                            Some(sum) => PrimitiveValue::Int64(sum),
                            None => {
                                return Err(Error::InvalidArgument(
                                    "integer overflow in SUM".to_string(),
                                ))
                            }
                        }
                    }
                    (Some(PrimitiveValue::Double(a)), PrimitiveValue::Double(b)) => {
                        PrimitiveValue::Double(a + b)
                    }
                    (Some(a), b) => {
                        return Err(Error::InvalidArgument(format!(
                            "cannot sum {:?} with {:?}",
                            a.kind(),
                            b.kind()
                        )))
                    }
                });
            }
            AggregateFn::Min | AggregateFn::Max => {
                let keep_new = match &self.state {
                    None => true,
                    Some(current) => {
                        let ord = order_of(current, &value)?;
                        match self.spec.func {
                            AggregateFn::Min => ord.is_gt(),
                            _ => ord.is_lt(),
                        }
                    }
                };
                if keep_new {
                    self.state = Some(value);
                }
            }
        }
        Ok(())
    }

    /// Final value of this aggregate.
    pub fn finish(self) -> SubDocument {
        match self.spec.func {
            AggregateFn::Count => SubDocument::int64(self.count),
            AggregateFn::Sum => SubDocument::Primitive(
                self.state.unwrap_or(PrimitiveValue::Int64(0)),
            ),
            AggregateFn::Min | AggregateFn::Max => match self.state {
                Some(p) => SubDocument::Primitive(p),
                None => SubDocument::null(),
            },
        }
    }
}

fn order_of(a: &PrimitiveValue, b: &PrimitiveValue) -> Result<std::cmp::Ordering> {
    match (a, b) {
        (PrimitiveValue::Int64(a), PrimitiveValue::Int64(b)) => Ok(a.cmp(b)),
        (PrimitiveValue::Double(a), PrimitiveValue::Double(b)) => Ok(a.total_cmp(b)),
        (PrimitiveValue::String(a), PrimitiveValue::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(Error::InvalidArgument(format!(
            "cannot order {:?} against {:?}",
            a.kind(),
            b.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(id: i32, v: PrimitiveValue) -> Row {
        let mut r = Row::new();
        r.set(ColumnId(id), SubDocument::Primitive(v));
        r
    }

    #[test]
    fn test_exists_conditions() {
        let row = Row::new();
        assert!(Condition::Exists.evaluate(Some(&row)).unwrap());
        assert!(!Condition::Exists.evaluate(None).unwrap());
        assert!(Condition::NotExists.evaluate(None).unwrap());
    }

    #[test]
    fn test_compare_int() {
        let row = row_with(1, PrimitiveValue::Int64(5));
        let cond = Condition::Compare {
            column: ColumnId(1),
            op: CompareOp::Gt,
            value: PrimitiveValue::Int64(3),
        };
        assert!(cond.evaluate(Some(&row)).unwrap());
        assert!(!cond.evaluate(None).unwrap());
    }

    #[test]
    fn test_compare_null_semantics() {
        let row = Row::new();
        let eq = Condition::Compare {
            column: ColumnId(1),
            op: CompareOp::Eq,
            value: PrimitiveValue::Int64(1),
        };
        let ne = Condition::Compare {
            column: ColumnId(1),
            op: CompareOp::Ne,
            value: PrimitiveValue::Int64(1),
        };
        assert!(!eq.evaluate(Some(&row)).unwrap());
        assert!(ne.evaluate(Some(&row)).unwrap());
    }

    #[test]
    fn test_compare_cross_type_is_error() {
        let row = row_with(1, PrimitiveValue::Int64(5));
        let cond = Condition::Compare {
            column: ColumnId(1),
            op: CompareOp::Eq,
            value: PrimitiveValue::String("5".to_string()),
        };
        assert!(cond.evaluate(Some(&row)).is_err());
    }

    #[test]
    fn test_and_or_not() {
        let row = row_with(1, PrimitiveValue::Int64(5));
        let gt3 = Condition::Compare {
            column: ColumnId(1),
            op: CompareOp::Gt,
            value: PrimitiveValue::Int64(3),
        };
        let lt4 = Condition::Compare {
            column: ColumnId(1),
            op: CompareOp::Lt,
            value: PrimitiveValue::Int64(4),
        };
        assert!(!Condition::And(vec![gt3.clone(), lt4.clone()]).evaluate(Some(&row)).unwrap());
        assert!(Condition::Or(vec![gt3, lt4.clone()]).evaluate(Some(&row)).unwrap());
        assert!(Condition::Not(Box::new(lt4)).evaluate(Some(&row)).unwrap());
    }

    #[test]
    fn test_referenced_columns_dedup() {
        let c = Condition::And(vec![
            Condition::Compare {
                column: ColumnId(1),
                op: CompareOp::Eq,
                value: PrimitiveValue::Int64(1),
            },
            Condition::Compare {
                column: ColumnId(1),
                op: CompareOp::Ne,
                value: PrimitiveValue::Int64(2),
            },
        ]);
        let mut cols = Vec::new();
        c.referenced_columns(&mut cols);
        assert_eq!(cols, vec![ColumnId(1)]);
    }

    #[test]
    fn test_count_ignores_nulls_for_column() {
        let mut acc = Accumulator::new(AggregateSpec {
            func: AggregateFn::Count,
            column: Some(ColumnId(1)),
        });
        acc.push(&row_with(1, PrimitiveValue::Int64(1))).unwrap();
        acc.push(&Row::new()).unwrap();
        assert_eq!(acc.finish(), SubDocument::int64(1));
    }

    #[test]
    fn test_sum_and_minmax() {
        let mut sum =
            Accumulator::new(AggregateSpec { func: AggregateFn::Sum, column: Some(ColumnId(1)) });
        let mut min =
            Accumulator::new(AggregateSpec { func: AggregateFn::Min, column: Some(ColumnId(1)) });
        let mut max =
            Accumulator::new(AggregateSpec { func: AggregateFn::Max, column: Some(ColumnId(1)) });
        for v in [3, 1, 2] {
            let row = row_with(1, PrimitiveValue::Int64(v));
            sum.push(&row).unwrap();
            min.push(&row).unwrap();
            max.push(&row).unwrap();
        }
        assert_eq!(sum.finish(), SubDocument::int64(6));
        assert_eq!(min.finish(), SubDocument::int64(1));
        assert_eq!(max.finish(), SubDocument::int64(3));
    }

    #[test]
    fn test_sum_overflow_is_a_domain_error() {
        let mut sum =
            Accumulator::new(AggregateSpec { func: AggregateFn::Sum, column: Some(ColumnId(1)) });
        let row = row_with(1, PrimitiveValue::Int64(i64::MAX));
        sum.push(&row).unwrap();
        let err = sum.push(&row).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
