#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod call;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod traits;
pub mod types;

pub use call::CallContext;
pub use error::{Error, Result};
pub use filter::{Filter, RangePredicate, TermPredicate};
