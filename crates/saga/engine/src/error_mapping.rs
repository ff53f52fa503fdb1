//! Recovering typed ledger failures from free-text ledger errors
//!
//! The ledger client reports failures as a transaction code, a list of
//! endorsement details and a message. [`ErrorMapper`] turns them into a
//! [`LedgerWriteError`] with a definite [`LedgerErrorKind`], evaluating in
//! this fixed order:
//!
//! 1. duplicate transaction id
//! 2. domain rejection rules, in declaration order
//! 3. timeout without a commit or abort signal
//! 4. transient, for everything else

use evote_saga_types::{DomainRejection, LedgerErrorKind, LedgerWriteError, Result, SagaError};
use regex::Regex;

/// Transaction code the orderer reports for a reused transaction id.
pub const DUPLICATE_TXID_CODE: &str = "DUPLICATE_TXID";

/// Endorsement detail prefix peers report for a reused transaction id.
pub const DUPLICATE_ENDORSEMENT_PREFIX: &str = "duplicate transaction found";

/// A failure exactly as the ledger client observed it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawLedgerFailure {
    pub transaction_code: Option<String>,
    pub endorsement_details: Vec<String>,
    /// The client gave up waiting without a definitive signal.
    pub timed_out: bool,
    pub message: String,
}

impl RawLedgerFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_transaction_code(mut self, code: impl Into<String>) -> Self {
        self.transaction_code = Some(code.into());
        self
    }

    pub fn with_endorsement_detail(mut self, detail: impl Into<String>) -> Self {
        self.endorsement_details.push(detail.into());
        self
    }

    pub fn is_duplicate(&self) -> bool {
        match &self.transaction_code {
            Some(code) => code == DUPLICATE_TXID_CODE,
            None => self
                .endorsement_details
                .iter()
                .any(|detail| detail.starts_with(DUPLICATE_ENDORSEMENT_PREFIX)),
        }
    }
}

/// Which part of a match becomes the reported message.
#[derive(Clone, Debug)]
enum Extract {
    Matched,
    /// Text after the marker, or the whole match when absent.
    AfterMarker(&'static str),
}

/// One `(pattern, rejection)` rule.
#[derive(Clone, Debug)]
pub struct ErrorRule {
    rejection: DomainRejection,
    pattern: Regex,
    extract: Extract,
    strip_newlines: bool,
}

impl ErrorRule {
    fn new(rejection: DomainRejection, pattern: &str) -> Result<Self> {
        Ok(Self {
            rejection,
            pattern: Regex::new(pattern)
                .map_err(|e| SagaError::Config(format!("invalid error rule {pattern}: {e}")))?,
            extract: Extract::Matched,
            strip_newlines: false,
        })
    }

    fn extract_after(mut self, marker: &'static str) -> Self {
        self.extract = Extract::AfterMarker(marker);
        self
    }

    fn single_line(mut self) -> Self {
        self.strip_newlines = true;
        self
    }

    pub fn rejection(&self) -> DomainRejection {
        self.rejection
    }

    /// The reported message if this rule matches.
    pub fn apply(&self, message: &str) -> Option<String> {
        let flattened;
        let haystack = if self.strip_newlines {
            flattened = message.replace(['\r', '\n'], "");
            flattened.as_str()
        } else {
            message
        };

        let matched = self.pattern.find(haystack)?.as_str();
        match self.extract {
            Extract::Matched => Some(matched.to_string()),
            Extract::AfterMarker(marker) => Some(
                matched
                    .split_once(marker)
                    .map(|(_, rest)| rest)
                    .unwrap_or(matched)
                    .to_string(),
            ),
        }
    }
}

/// Ordered rule list mapping raw ledger failures to typed errors.
#[derive(Clone, Debug)]
pub struct ErrorMapper {
    rules: Vec<ErrorRule>,
}

impl ErrorMapper {
    /// The chaincode's rejection rules, in evaluation order.
    pub fn new() -> Result<Self> {
        let rules = vec![
            ErrorRule::new(DomainRejection::NeedAdminPrivilege, r"Need Admin \w*")?,
            ErrorRule::new(DomainRejection::AssetNotFound, r"([tT]he )?[aA]sset \w* does not exist")?,
            ErrorRule::new(
                DomainRejection::FunctionNotFound,
                r"You've asked to invoke a function that does not exist: \w*",
            )?,
            ErrorRule::new(
                DomainRejection::UnauthorizedBallotAccess,
                r"You dont have access to read Ballot \w*",
            )?,
            ErrorRule::new(DomainRejection::NoValidPeerResponse, r"No valid responses from any peers.*")?
                .single_line()
                .extract_after("message="),
        ];
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ErrorRule] {
        &self.rules
    }

    /// First rule matching the message, with the text it reports.
    pub fn match_rejection(&self, message: &str) -> Option<(DomainRejection, String)> {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(message).map(|text| (rule.rejection, text)))
    }

    /// Map a raw failure of the given transaction to a typed error.
    pub fn map(&self, transaction_id: &str, raw: &RawLedgerFailure) -> LedgerWriteError {
        let error = if raw.is_duplicate() {
            LedgerWriteError::new(LedgerErrorKind::Duplicate, raw.message.clone())
        } else if let Some((rejection, text)) = self.match_rejection(&raw.message) {
            LedgerWriteError::rejected(rejection, text)
        } else if raw.timed_out {
            LedgerWriteError::timeout(raw.message.clone())
        } else {
            LedgerWriteError::transient(raw.message.clone())
        };

        tracing::debug!(
            transaction_id,
            kind = ?error.kind,
            "Mapped ledger failure"
        );

        error.with_transaction_id(transaction_id)
    }
}
