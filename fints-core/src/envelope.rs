//! Message envelope: wraps business segments in the PIN/TAN security
//! headers and the outer HNHBK/HNHBS frame.
//!
//! Layout on the wire:
//!
//! ```text
//! HNHBK (header, 12-digit total length)
//! HNVSK (encryption head)
//! HNVSD (envelope around: HNSHK sig head + business segments + HNSHA sig trail)
//! HNHBS (trailer, message number)
//! ```
//!
//! Security values are placeholders as mandated for PIN/TAN: the cipher is
//! "none", the key name `@8@00000000`. The PIN (and TAN, if any) travel in
//! the HNSHA trailer.

use chrono::Local;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::ConnectionContext;
use crate::error::ProtocolError;

const COUNTRY_CODE: &str = "280";
const SECFUNC_ENC_PLAIN: &str = "998";
const SECFUNC_SIG_SINGLE_STEP: &str = "999";
const MASK: &str = "XXXXXX";

/// Protocol version spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum HbciVersion {
    /// HBCI 2.2 (FinTS 2.2), the legacy dialect.
    V220,
    /// FinTS 3.0, the current dialect.
    V300,
}

impl HbciVersion {
    /// Numeric version as it appears in the HNHBK header.
    pub fn code(&self) -> u32 {
        match self {
            HbciVersion::V220 => 220,
            HbciVersion::V300 => 300,
        }
    }
}

impl TryFrom<u32> for HbciVersion {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            220 => Ok(HbciVersion::V220),
            300 => Ok(HbciVersion::V300),
            other => Err(ProtocolError::UnsupportedVersion(other)),
        }
    }
}

impl From<HbciVersion> for u32 {
    fn from(value: HbciVersion) -> Self {
        value.code()
    }
}

/// Assemble a complete request message around the given business segments.
/// Segment numbers in `segments` must start at 3 (1 and 2 are the header
/// and the signature head) and be contiguous; the trailer numbers derive
/// from `segments.len()`.
///
/// `tan` is a response to a pending challenge and is appended to the PIN
/// in the signature trailer.
pub fn assemble_request(
    ctx: &ConnectionContext,
    segments: &[String],
    tan: Option<&str>,
) -> Result<String, ProtocolError> {
    let sec_ref: u64 = rand::thread_rng().gen_range(1_000_000..=999_999_999_999);
    let now = Local::now();
    let date = now.format("%Y%m%d").to_string();
    let time = now.format("%H%M%S").to_string();
    assemble_request_with(ctx, segments, tan, sec_ref, &date, &time)
}

/// Deterministic variant of [`assemble_request`]: the security reference
/// and timestamps come from the caller instead of the clock and the RNG.
pub fn assemble_request_with(
    ctx: &ConnectionContext,
    segments: &[String],
    tan: Option<&str>,
    sec_ref: u64,
    date: &str,
    time: &str,
) -> Result<String, ProtocolError> {
    ctx.validate()?;

    let bank_code = ctx.primary_bank_code();
    let login = &ctx.login_id;
    let system_id = ctx.dialog.system_id_or_zero();
    let dialog_id = ctx.dialog.dialog_id_or_new();
    let msg_num = ctx.dialog.message_number_or_first();
    let mode = ctx.dialog.security_mode.as_deref();
    let last_seg = 2 + segments.len() as u32;

    let (enc_head, sig_head, sig_trail) = match ctx.version {
        HbciVersion::V300 => {
            // PIN:1 marks single-step, PIN:2 two-step security.
            let secfunc = match mode {
                None | Some("999") => "1",
                Some(_) => "2",
            };
            let enc_head = format!(
                "HNVSK:998:3+PIN:{secfunc}+{SECFUNC_ENC_PLAIN}+1+1::{system_id}\
                 +1:{date}:{time}+2:2:13:@8@00000000:5:1\
                 +{COUNTRY_CODE}:{bank_code}:{login}:V:0:0+0'"
            );
            let sig_mode = mode.unwrap_or(SECFUNC_SIG_SINGLE_STEP);
            let sig_head = format!(
                "HNSHK:2:4+PIN:{secfunc}+{sig_mode}+{sec_ref}+1+1+1::{system_id}\
                 +1+1:{date}:{time}+1:999:1+6:10:16\
                 +{COUNTRY_CODE}:{bank_code}:{login}:S:0:0'"
            );
            let sig_trail = match tan {
                None => format!("HNSHA:{}:2+{sec_ref}++{}'", last_seg + 1, ctx.pin),
                Some(tan) => {
                    format!("HNSHA:{}:2+{sec_ref}++{}:{tan}'", last_seg + 1, ctx.pin)
                }
            };
            (enc_head, sig_head, sig_trail)
        }
        HbciVersion::V220 => {
            let enc_head = format!(
                "HNVSK:{SECFUNC_ENC_PLAIN}:2+998+1+1::{system_id}\
                 +1:{date}:{time}+2:2:13:@8@00000000:5:1\
                 +{COUNTRY_CODE}:{bank_code}:{login}:V:0:0+0'"
            );
            let sig_mode = mode.unwrap_or("900");
            let sig_head = format!(
                "HNSHK:2:3+{sig_mode}+{sec_ref}+1+1+1::{system_id}\
                 +1+1:{date}:{time}+1:999:1+6:10:16\
                 +{COUNTRY_CODE}:{bank_code}:{login}:S:0:0'"
            );
            let sig_trail = match tan {
                None => format!("HNSHA:{}:1+{sec_ref}++{}'", last_seg + 1, ctx.pin),
                Some(tan) => {
                    format!("HNSHA:{}:1+{sec_ref}++{}:{tan}'", last_seg + 1, ctx.pin)
                }
            };
            (enc_head, sig_head, sig_trail)
        }
    };

    let inner = format!("{sig_head}{}{sig_trail}", segments.concat());
    let payload = format!("HNVSD:999:1+@{}@{inner}'", latin1_len(&inner));
    let trailer = format!("HNHBS:{}:1+{msg_num}'", last_seg + 2);

    // The length field is 12 digits wide whatever the value, so the header
    // size is known before the value is.
    let header_tail = format!("+{}+{dialog_id}+{msg_num}'", ctx.version.code());
    let total = "HNHBK:1:3+".len()
        + 12
        + header_tail.len()
        + latin1_len(&enc_head)
        + latin1_len(&payload)
        + trailer.len();
    let header = format!("HNHBK:1:3+{total:012}{header_tail}");

    debug!(message = %mask(&format!("{header}{enc_head}{payload}{trailer}"), ctx, tan), "assembled request");

    Ok(format!("{header}{enc_head}{payload}{trailer}"))
}

/// Byte length of a string in its ISO-8859-1 encoding. Every transmittable
/// character occupies exactly one byte there.
fn latin1_len(value: &str) -> usize {
    value.chars().count()
}

/// Blank out credentials before a message reaches a log sink.
fn mask(message: &str, ctx: &ConnectionContext, tan: Option<&str>) -> String {
    let mut out = message.replace(&ctx.login_id, MASK).replace(&ctx.pin, MASK);
    if let Some(tan) = tan {
        out = out.replace(tan, MASK);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use crate::segment::SegmentBuilder;

    fn sync_segments() -> Vec<String> {
        vec![SegmentBuilder::new("HKSYN", 3, 3).field("0").finish()]
    }

    #[test]
    fn test_v300_frame_layout() {
        let ctx = test_context();
        let msg =
            assemble_request_with(&ctx, &sync_segments(), None, 1234567, "20260829", "101500")
                .unwrap();

        assert!(msg.starts_with("HNHBK:1:3+"));
        assert!(msg.ends_with("HNHBS:5:1+1'"));
        assert!(msg.contains("HNVSK:998:3+PIN:1+998+1+1::0+1:20260829:101500"));
        assert!(msg.contains("HNSHK:2:4+PIN:1+999+1234567+1+1+1::0"));
        assert!(msg.contains("HKSYN:3:3+0'"));
        assert!(msg.contains("HNSHA:4:2+1234567++1234'"));
        // fresh dialog: id 0, message number 1
        assert!(msg.contains("+300+0+1'"));
    }

    #[test]
    fn test_v300_header_length_is_exact() {
        let ctx = test_context();
        let msg =
            assemble_request_with(&ctx, &sync_segments(), None, 1234567, "20260829", "101500")
                .unwrap();
        let field = &msg["HNHBK:1:3+".len().."HNHBK:1:3+".len() + 12];
        assert_eq!(field.len(), 12);
        assert_eq!(field.parse::<usize>().unwrap(), msg.chars().count());
    }

    #[test]
    fn test_v300_two_step_mode_switches_secfunc() {
        let mut ctx = test_context();
        ctx.dialog.security_mode = Some("911".into());
        let msg =
            assemble_request_with(&ctx, &sync_segments(), None, 777, "20260829", "101500")
                .unwrap();
        assert!(msg.contains("HNVSK:998:3+PIN:2+"));
        assert!(msg.contains("HNSHK:2:4+PIN:2+911+777+"));
    }

    #[test]
    fn test_tan_is_appended_to_signature_trailer() {
        let mut ctx = test_context();
        ctx.dialog.security_mode = Some("911".into());
        let msg =
            assemble_request_with(&ctx, &sync_segments(), Some("482936"), 777, "20260829", "101500")
                .unwrap();
        assert!(msg.contains("HNSHA:4:2+777++1234:482936'"));
    }

    #[test]
    fn test_v220_frame_layout() {
        let mut ctx = test_context();
        ctx.version = HbciVersion::V220;
        let msg =
            assemble_request_with(&ctx, &sync_segments(), None, 555, "20260829", "101500")
                .unwrap();
        assert!(msg.contains("HNVSK:998:2+998+1+1::0"));
        assert!(msg.contains("HNSHK:2:3+900+555+"));
        assert!(msg.contains("HNSHA:4:1+555++1234'"));
        assert!(msg.contains("+220+0+1'"));
    }

    #[test]
    fn test_envelope_byte_budget_accounts_for_payload_marker() {
        let ctx = test_context();
        let msg =
            assemble_request_with(&ctx, &sync_segments(), None, 1234567, "20260829", "101500")
                .unwrap();
        let inner = "HNSHK";
        let at = msg.find("HNVSD:999:1+@").unwrap() + "HNVSD:999:1+@".len();
        let len_end = msg[at..].find('@').unwrap();
        let declared: usize = msg[at..at + len_end].parse().unwrap();
        let body_start = at + len_end + 1;
        assert!(msg[body_start..].starts_with(inner));
        assert_eq!(msg[body_start..body_start + declared].matches("HNSHA").count(), 1);
    }

    #[test]
    fn test_mask_blanks_credentials() {
        let ctx = test_context();
        let masked = mask("pin 1234 user 760794644 tan 9999", &ctx, Some("9999"));
        assert!(!masked.contains("1234"));
        assert!(!masked.contains("760794644"));
        assert!(!masked.contains("9999"));
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        assert!(matches!(
            HbciVersion::try_from(201),
            Err(ProtocolError::UnsupportedVersion(201))
        ));
        assert_eq!(HbciVersion::try_from(300).unwrap(), HbciVersion::V300);
    }
}
