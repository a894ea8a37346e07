//! Capability gateway: typed calls to the external AI services that analyze,
//! plan, write, review, and illustrate, plus the retry and usage-accounting
//! wrapper every call goes through.

pub mod error;
pub mod http;
pub mod invoker;
pub mod ledger;
pub mod provider;
pub mod structured;
pub mod types;

pub use error::{CapabilityError, ErrorKind, ParseError};
pub use http::HttpCapabilityClient;
pub use invoker::ResilientInvoker;
pub use ledger::{ResourceLedger, UsageSnapshot, UsageTotals};
pub use provider::CapabilityProvider;
pub use structured::parse_structured_output;
pub use types::{
    AnalyzeRequest, Capability, IllustrateRequest, Metered, PlanRequest, ReviewRequest, Usage,
    WriteRequest,
};
