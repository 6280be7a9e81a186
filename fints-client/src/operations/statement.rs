//! Account statement fetch (HKKAZ for MT940, HKCAZ for camt). Large
//! histories arrive in pages: each partial answer carries code 3040 with a
//! cursor, and the fetch repeats with that cursor until the bank stops
//! sending one. Payload pages are concatenated in arrival order.

use async_trait::async_trait;
use chrono::NaiveDate;
use fints_core::{ConnectionContext, DialogResult, continuation_cursor};
use regex::Regex;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::operations::{account_address, attach_tan_request, step_outcome, tan};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementFormat {
    /// SWIFT MT940 text via HKKAZ.
    Mt940,
    /// ISO 20022 camt XML via HKCAZ.
    Camt,
}

pub struct StatementOperation {
    format: StatementFormat,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    cursor: Option<String>,
    payload: String,
    pages: u32,
}

impl StatementOperation {
    pub fn new(format: StatementFormat, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            format,
            from,
            to,
            cursor: None,
            payload: String::new(),
            pages: 0,
        }
    }

    /// Concatenated statement payload of all pages received so far.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    fn request_segments(&self, ctx: &ConnectionContext) -> Vec<String> {
        let code = match self.format {
            StatementFormat::Mt940 => "HKKAZ",
            StatementFormat::Camt => "HKCAZ",
        };
        let version = match self.format {
            StatementFormat::Mt940 => ctx.dialog.statement_version_or_fallback(),
            StatementFormat::Camt => 1,
        };
        // from version 7 on both addressings travel together
        let address = if version >= 7 || self.format == StatementFormat::Camt {
            format!(
                "{}:{}:{}::280:{}",
                ctx.iban, ctx.bic, ctx.account_number, ctx.bank_code
            )
        } else {
            account_address(ctx, version, 7)
        };

        let mut head = format!("{code}:3:{version}+{address}");
        if self.format == StatementFormat::Camt {
            let scheme = ctx
                .bpd
                .camt_schemes
                .first()
                .map(String::as_str)
                .unwrap_or("camt.052.001.02");
            head.push('+');
            head.push_str(scheme);
        }
        head.push_str("+N");

        let range = match (&self.from, &self.to) {
            (Some(from), to) => format!(
                "+{}+{}",
                from.format("%Y%m%d"),
                to.map(|d| d.format("%Y%m%d").to_string()).unwrap_or_default()
            ),
            (None, _) => String::new(),
        };
        let tail = match (range.is_empty(), &self.cursor) {
            (true, None) => String::new(),
            (true, Some(cursor)) => format!("++++{cursor}"),
            (false, None) => range.clone(),
            (false, Some(cursor)) => format!("{range}++{cursor}"),
        };

        let mut segments = vec![format!("{head}{tail}'")];
        attach_tan_request(ctx, code, &mut segments);
        segments
    }

    /// Fold one successful answer in: collect its payload page and arm the
    /// cursor for the next round, if any.
    fn absorb(&mut self, result: &DialogResult) -> bool {
        if let Some(page) = extract_payload(self.format, result.raw()) {
            self.payload.push_str(&page);
            self.pages += 1;
        }
        self.cursor = continuation_cursor(result.raw());
        debug!(pages = self.pages, more = self.cursor.is_some(), "statement page absorbed");
        self.cursor.is_some()
    }

    async fn fetch_loop(
        &mut self,
        session: &mut Session,
        mut result: DialogResult,
    ) -> Result<StepOutcome, ClientError> {
        loop {
            if result.is_sca_required() {
                return Ok(step_outcome(session, result));
            }
            if !result.is_success() {
                return Ok(StepOutcome::Done(result));
            }
            if !self.absorb(&result) {
                info!(pages = self.pages, "statement fetch complete");
                return Ok(StepOutcome::Done(result));
            }
            let segments = self.request_segments(session.context());
            result = session.send(&segments, None).await?;
        }
    }
}

#[async_trait]
impl Operation for StatementOperation {
    fn name(&self) -> &'static str {
        "statements"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        let segments = self.request_segments(session.context());
        let result = session.send(&segments, None).await?;
        self.fetch_loop(session, result).await
    }

    async fn confirm(
        &mut self,
        session: &mut Session,
        tan_value: &str,
    ) -> Result<StepOutcome, ClientError> {
        let result = tan::confirm(session, tan_value).await?;
        self.fetch_loop(session, result).await
    }
}

/// Statement page inside the job answer. The payload sits in a binary
/// field and runs up to the signature trailer or the message end.
fn extract_payload(format: StatementFormat, raw: &str) -> Option<String> {
    let pattern = match format {
        StatementFormat::Mt940 => r"(?s)HIKAZ:.+?@\d+@[\n\r]*(?P<payload>.+?)('HNSHA|''HNHBS)",
        StatementFormat::Camt => r"(?s)HICAZ:.+?@\d+@[\n\r]*(?P<payload>.+?)('HNSHA|''HNHBS)",
    };
    let rx = Regex::new(pattern).expect("static pattern");
    rx.captures(raw).map(|caps| caps["payload"].to_string())
}
