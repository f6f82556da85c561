//! Transaction-side queries at the wallet boundary

mod fee;

pub use fee::{
    ChangePubKeyAuth, ChangePubKeyFee, Fee, FeeAccount, FeeProvider, FeeQuoteService,
    VerificationMethod,
};
