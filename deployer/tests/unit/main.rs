//! Integration tests

mod support;
mod test_engine;
mod test_fsm;
mod test_history;
mod test_reconcile;
