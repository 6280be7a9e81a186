//! Response classification: turns a decoded bank response into result
//! messages and folds the negotiated values back into the dialog state.
//!
//! Banks report outcomes as `code::text` pairs inside HIRMG (message level)
//! and HIRMS (segment level). Codes starting with `9` are errors; success
//! is defined as the absence of error codes, not the presence of a success
//! code. A handful of codes carry protocol meaning beyond their text and
//! are matched explicitly here.

use regex::Regex;
use tracing::{debug, warn};

use crate::bpd::BankParameters;
use crate::context::ConnectionContext;
use crate::error::ProtocolError;
use crate::segment::{self, extract_between};

/// Strong customer authentication required; a TAN challenge is pending.
pub const SCA_CODE: &str = "0030";
/// Carries the list of TAN modes the bank currently allows.
pub const TAN_MODES_CODE: &str = "3920";
/// Partial result; a continuation cursor follows the code.
pub const CONTINUATION_CODE: &str = "3040";

/// One `code::text` result message from HIRMG or HIRMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankMessage {
    pub code: String,
    pub text: String,
}

impl BankMessage {
    /// Codes 9xxx are errors; everything else is informational or a
    /// warning.
    pub fn is_error(&self) -> bool {
        self.code.starts_with('9')
    }
}

impl std::fmt::Display for BankMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.text)
    }
}

/// Outcome of one request/response round trip.
#[derive(Debug, Clone, Default)]
pub struct DialogResult {
    raw: String,
    messages: Vec<BankMessage>,
}

impl DialogResult {
    pub fn new(raw: String, messages: Vec<BankMessage>) -> Self {
        Self { raw, messages }
    }

    /// Decoded response body, for payload extraction by the caller.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn messages(&self) -> &[BankMessage] {
        &self.messages
    }

    /// Success means no error-class code was reported.
    pub fn is_success(&self) -> bool {
        !self.messages.iter().any(|m| m.is_error())
    }

    /// Whether the bank demands a TAN before executing the order.
    pub fn is_sca_required(&self) -> bool {
        self.find(SCA_CODE).is_some()
    }

    pub fn find(&self, code: &str) -> Option<&BankMessage> {
        self.messages.iter().find(|m| m.code == code)
    }

    /// All error messages joined for surfacing to the caller.
    pub fn error_summary(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.is_error())
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Classify a decoded response and update the dialog state from it.
///
/// Besides collecting the HIRMG/HIRMS result messages this extracts every
/// negotiated value the response carries: dialog id, message counter,
/// system id, BPD, segment versions and the allowed TAN modes. Mode
/// negotiation is the one case where classification itself can fail: a
/// previously selected mode the bank no longer offers is unrecoverable
/// within the dialog.
pub fn classify(
    ctx: &mut ConnectionContext,
    response: &str,
) -> Result<DialogResult, ProtocolError> {
    let bpd_slice = bpd_slice(response);
    if !bpd_slice.is_empty() {
        ctx.bpd = BankParameters::parse(&bpd_slice);
    }

    let mut messages = Vec::new();

    for item in segment::split_segments(response) {
        if item.contains("HIRMG") || item.contains("HIRMS") {
            let batch = parse_result_fields(&item);
            if item.contains("HIRMS") {
                if let Some(security) = batch.iter().find(|m| m.code == TAN_MODES_CODE) {
                    negotiate_tan_modes(ctx, &security.text)?;
                }
            }
            messages.extend(batch);
        }

        if item.contains("HNHBK") {
            let id = extract_between(&item, "+1+", ":1");
            if !id.is_empty() {
                ctx.dialog.dialog_id = id;
            }
        }

        if item.contains("HISYN") {
            if let Some(at) = item.find('+') {
                let id = item[at + 1..].to_string();
                debug!(system_id = %id, "customer system id assigned");
                ctx.dialog.system_id = id;
            }
        }

        if item.contains("HNHBS") {
            ctx.dialog.message_number = next_message_number(&item)?;
        }

        if item.contains("HISALS") {
            let ver = extract_between(&item.replace("HISALS:", ""), ":", ":");
            if let Ok(ver) = ver.parse::<u32>() {
                ctx.dialog.balance_version = Some(ver);
            }
            ctx.dialog.balance_params = Some(item.clone());
        }

        if item.contains("HITANS") {
            let selector =
                extract_between(&item.replace("HITANS:", ""), ":", "+").replace(':', "+");
            if !selector.is_empty() {
                ctx.dialog.tan_selector = Some(selector);
            }
        }

        if item.contains("HKKAZ") {
            // Allowed-transaction tables list HKKAZ versions with `;`
            // separators. The highest advertised version wins.
            let rx = Regex::new(r"HKKAZ;(\d+);").expect("static pattern");
            for caps in rx.captures_iter(&item) {
                if let Ok(ver) = caps[1].parse::<u32>() {
                    let current = ctx.dialog.statement_version.unwrap_or(0);
                    if ver > current {
                        ctx.dialog.statement_version = Some(ver);
                    }
                }
            }
        }

        if item.contains("HISPAS") {
            ctx.dialog.pain_version = Some(pain_version_from_hispas(&item));
        }
    }

    Ok(DialogResult::new(response.to_string(), messages))
}

/// Collect the HIRMG/HIRMS result messages of a response without touching
/// any state. Used on responses whose negotiated values have already been
/// consumed, e.g. a dialog-end acknowledgement.
pub fn parse_result_messages(response: &str) -> Vec<BankMessage> {
    segment::split_segments(response)
        .iter()
        .filter(|item| item.contains("HIRMG") || item.contains("HIRMS"))
        .flat_map(|item| parse_result_fields(item))
        .collect()
}

/// Cursor for resuming a paginated statement fetch, from code 3040.
pub fn continuation_cursor(response: &str) -> Option<String> {
    let rx = Regex::new(&format!(
        r"\+{CONTINUATION_CODE}::[^:]+:(?P<startpoint>[^']+)'"
    ))
    .expect("static pattern");
    rx.captures(response)
        .map(|caps| caps["startpoint"].to_string())
}

/// Challenge reference of a pending HITAN segment, needed to answer it.
pub fn challenge_reference(response: &str) -> Option<String> {
    hitan_fields(response).and_then(|fields| fields.get(3).map(|f| segment::unescape(f)))
}

/// Human-readable challenge text of a pending HITAN segment.
pub fn challenge_text(response: &str) -> Option<String> {
    hitan_fields(response)
        .and_then(|fields| fields.get(4).map(|f| segment::unescape(f)))
        .filter(|t| !t.is_empty())
}

/// Fields of the first HITAN segment, split on unescaped `+`.
/// `HITAN:n:v:r+process++reference+challenge`.
fn hitan_fields(response: &str) -> Option<Vec<String>> {
    let item = segment::split_segments(response)
        .into_iter()
        .find(|s| s.starts_with("HITAN:"))?;
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in item.chars() {
        if escaped {
            current.push('?');
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '?' => escaped = true,
            '+' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    Some(fields)
}

/// Apply a 3920 message: remember the allowed modes, adopt the first one
/// when none is selected yet, reject a selected mode that fell out of the
/// set.
fn negotiate_tan_modes(ctx: &mut ConnectionContext, text: &str) -> Result<(), ProtocolError> {
    let rx = Regex::new(r"\d+").expect("static pattern");
    let allowed: Vec<String> = rx
        .find_iter(text)
        .map(|m| m.as_str().trim_start_matches('0').to_string())
        .filter(|t| t.starts_with('9'))
        .collect();
    if allowed.is_empty() {
        warn!("security message 3920 listed no TAN modes");
        return Ok(());
    }

    match &ctx.dialog.security_mode {
        None => {
            debug!(mode = %allowed[0], "adopting first allowed TAN mode");
            ctx.dialog.security_mode = Some(allowed[0].clone());
        }
        Some(selected) => {
            if !allowed.contains(selected) {
                return Err(ProtocolError::TanModeMismatch {
                    selected: selected.clone(),
                    allowed: allowed.join(";"),
                });
            }
        }
    }

    ctx.dialog.allowed_modes = allowed;
    ctx.tan_processes = ctx.bpd.tan_processes_for(&ctx.dialog.allowed_modes);
    Ok(())
}

/// `code::text` pairs of one HIRMG/HIRMS segment. Reference parameters
/// between the separators are ignored, escaped colons in the text are
/// restored.
fn parse_result_fields(item: &str) -> Vec<BankMessage> {
    let rx = Regex::new(r"(\d{4}):.*?:(.+)").expect("static pattern");
    item.split('+')
        .filter_map(|field| {
            rx.captures(field).map(|caps| BankMessage {
                code: caps[1].to_string(),
                text: caps[2].replace("?:", ":"),
            })
        })
        .collect()
}

/// Message counter for the next request, derived from the bank's HNHBS.
fn next_message_number(item: &str) -> Result<String, ProtocolError> {
    let value = extract_between(&format!("{}'", item.replace("HNHBS:", "")), "+", "'");
    if value.is_empty() || value == "0" {
        return Ok("2".to_string());
    }
    let n: u32 = value
        .parse()
        .map_err(|_| ProtocolError::Software(format!("bad HNHBS counter: {value}")))?;
    Ok((n + 1).to_string())
}

fn pain_version_from_hispas(item: &str) -> crate::dialog::PainVersion {
    use crate::dialog::PainVersion::*;
    if item.contains("pain.001.001.03") {
        V00100103
    } else if item.contains("pain.001.002.03") {
        V00100203
    } else {
        // Most banks accept the newest pain version.
        V00100303
    }
}

/// BPD slice of a response, from HIBPA up to the next top-level segment.
fn bpd_slice(response: &str) -> String {
    let rx = Regex::new(r"(?s)(HIBPA.+?)\b(HNHBS|HISYN|HIUPA)\b").expect("static pattern");
    rx.captures(response)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}
