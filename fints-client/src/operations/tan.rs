//! Second-factor plumbing: the confirmation round that answers a pending
//! challenge (TAN process 2) and the TAN media query (HKTAB).

use async_trait::async_trait;
use fints_core::{ConnectionContext, DialogResult, segment, split_segments};
use tracing::info;

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::session::Session;

/// Answer the pending challenge. The TAN itself travels in the signature
/// trailer; the HKTAN segment quotes the challenge reference with process
/// code 2.
pub async fn confirm(session: &mut Session, tan: &str) -> Result<DialogResult, ClientError> {
    let segment = confirmation_segment(session.context())?;
    let result = session.send(&[segment], Some(tan)).await?;
    session.context_mut().dialog.tan_challenge_ref = None;
    Ok(result)
}

/// HKTAN process-2 segment per negotiated HITANS version. The position of
/// the challenge reference moved between versions.
fn confirmation_segment(ctx: &ConnectionContext) -> Result<String, ClientError> {
    let reference = ctx
        .dialog
        .tan_challenge_ref
        .as_deref()
        .ok_or_else(|| ClientError::Step("no pending TAN challenge".into()))?;
    let selector = ctx.dialog.tan_selector.as_deref().unwrap_or("6+4");
    let version: u32 = selector
        .split('+')
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let body = match version {
        2..=4 => format!("HKTAN:3:{version}+2++{reference}++N"),
        6 => format!("HKTAN:3:{version}+2++++{reference}+N"),
        _ => format!("HKTAN:3:{version}+2++++{reference}++N"),
    };
    Ok(match ctx.dialog.tan_medium.as_deref() {
        None => format!("{body}'"),
        Some(medium) => format!("{body}++++{medium}'"),
    })
}

/// Queries the active TAN media (HKTAB), e.g. the registered phone or app
/// aliases, so the caller can pick one before an order.
pub struct TanMediaOperation {
    media: Vec<String>,
}

impl TanMediaOperation {
    pub fn new() -> Self {
        Self { media: Vec::new() }
    }

    pub fn media(&self) -> &[String] {
        &self.media
    }
}

impl Default for TanMediaOperation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operation for TanMediaOperation {
    fn name(&self) -> &'static str {
        "tan media"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        // 0 = all media, A = all classes
        let segments = vec!["HKTAB:3:4+0+A'".to_string()];
        let result = session.send(&segments, None).await?;
        if result.is_success() {
            self.media = parse_tan_media(result.raw());
            info!(media = ?self.media, "TAN media received");
        }
        Ok(StepOutcome::Done(result))
    }
}

/// Media names out of the HITAB answer. Each medium is one `+`-field whose
/// first subfield is the media class; the name is the last populated
/// subfield.
fn parse_tan_media(response: &str) -> Vec<String> {
    let mut media = Vec::new();
    for item in split_segments(response) {
        if !item.starts_with("HITAB") {
            continue;
        }
        for field in item.split('+').skip(2) {
            let subfields: Vec<&str> = field.split(':').collect();
            if !matches!(subfields.first(), Some(&"A" | &"G" | &"M" | &"S")) {
                continue;
            }
            if let Some(name) = subfields.iter().rev().find(|s| !s.is_empty()) {
                if name.len() > 1 {
                    media.push(segment::unescape(name));
                }
            }
        }
    }
    media
}
