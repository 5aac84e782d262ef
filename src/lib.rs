//! Capital gains tax on buy/sell stock operations.
//!
//! Each batch of operations is an independent portfolio that starts empty.
//! [`tax::process_batch`] folds the batch through the weighted-average cost
//! rules and returns the position and tax after every operation.

pub mod tax;
