//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod transaction;
pub mod types;

pub use error::{AppError, ConfigError, NodeError, TransactionError, UpstreamError, ValidationError};
pub use traits::{FeeScheduleProvider, NodeClient};
pub use transaction::{ParsedTransaction, PreviousOutput, TxOutput};
pub use types::{
    API_VERSION, BlockInfo, ERROR_PREFIX, ErrorResponse, Fee, FeeDecision, FeeQuote, FeeSchedule,
    FeeType, FeeUnit, HealthResponse, HealthStatus, Invocation, JsonEnvelope,
    MultiTransactionStatusResponse, RawTransactionInfo, ReconciledOutcome, RequiredFees,
    ResponseSet, ReturnResult, SubmissionOutcome, SubmitTransactionRequest, TransactionResponse,
    TransactionStatus, TxQueryData,
};
