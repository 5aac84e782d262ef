pub mod batch;
pub mod cgt;
pub mod money;

// Flat public surface for domain types and functions.
pub use batch::{batch_lines, parse_batch, write_taxes, BatchError, BatchInput, OperationRecord};
pub use cgt::{
    apply_operation, process_batch, process_batch_from, Operation, OperationKind, OperationResult,
    Position, TaxError, EXEMPTION_LIMIT, TAX_RATE,
};
pub use money::{Currency, Money, MoneyError};
