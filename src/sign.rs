use crate::schema::OperationType;
use rust_decimal::Decimal;

/// Coerces a raw summed amount to the sign the statement line declares.
///
/// Ledgers store amounts with inconsistent signs per account, so the intended sign
/// belongs to the line. Totalizers are never fed through here by the aggregator; for
/// them the value passes through untouched.
pub fn normalize(operation_type: OperationType, raw: Decimal) -> Decimal {
    match operation_type {
        OperationType::Add => raw.abs(),
        OperationType::Subtract if raw.is_zero() => Decimal::ZERO,
        OperationType::Subtract => -raw.abs(),
        OperationType::Signed | OperationType::Total => raw,
    }
}
