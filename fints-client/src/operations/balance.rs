//! Balance query (HKSAL) and the HISAL answer.

use async_trait::async_trait;
use fints_core::extract_between;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::operations::{account_address, attach_tan_request, step_outcome, tan};
use crate::session::Session;

/// Booked balance with the optional figures banks append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Text of the last HIRMS result message.
    pub message: String,
    /// Booked balance; debit balances are negative.
    pub balance: f64,
    pub currency: Option<String>,
    pub account_type: Option<String>,
    pub account_number: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub bank_code: Option<String>,
    /// Sum of transactions not yet booked.
    pub marked_transactions: Option<f64>,
    pub credit_line: Option<f64>,
    pub available_balance: Option<f64>,
}

pub struct BalanceOperation {
    balance: Option<AccountBalance>,
}

impl BalanceOperation {
    pub fn new() -> Self {
        Self { balance: None }
    }

    pub fn balance(&self) -> Option<&AccountBalance> {
        self.balance.as_ref()
    }

    pub fn into_balance(self) -> Option<AccountBalance> {
        self.balance
    }
}

impl Default for BalanceOperation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operation for BalanceOperation {
    fn name(&self) -> &'static str {
        "balance"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        let ctx = session.context();
        let version = ctx.dialog.balance_version.unwrap_or(5);
        let mut segments = vec![format!(
            "HKSAL:3:{version}+{}+N'",
            account_address(ctx, version, 7)
        )];
        attach_tan_request(ctx, "HKSAL", &mut segments);

        let result = session.send(&segments, None).await?;
        let outcome = step_outcome(session, result);
        if let StepOutcome::Done(result) = &outcome {
            if result.is_success() {
                self.balance = Some(parse_balance(result.raw())?);
                info!(balance = self.balance.as_ref().map(|b| b.balance), "balance received");
            }
        }
        Ok(outcome)
    }

    async fn confirm(
        &mut self,
        session: &mut Session,
        tan_value: &str,
    ) -> Result<StepOutcome, ClientError> {
        let result = tan::confirm(session, tan_value).await?;
        if result.is_success() {
            self.balance = Some(parse_balance(result.raw())?);
        }
        Ok(StepOutcome::Done(result))
    }
}

/// Pick the HISAL fields apart. The account group comes in two shapes:
/// `number:bic::bankcode` for domestic addressing, `iban:bic` for SEPA
/// addressing. The trailing fields from the marked sum on are optional.
pub fn parse_balance(raw: &str) -> Result<AccountBalance, ClientError> {
    let message = last_result_text(raw);

    if !raw.contains("+0020::") {
        return Err(ClientError::Bank(message));
    }

    let hisal = extract_between(raw, "HISAL", "'");
    let parts: Vec<&str> = hisal.split('+').collect();
    if parts.len() < 5 {
        return Err(ClientError::Bank(format!("malformed HISAL answer: {hisal}")));
    }

    let mut balance = AccountBalance {
        message,
        ..Default::default()
    };

    let account: Vec<&str> = parts[1].split(':').collect();
    if account.len() == 4 {
        balance.account_number = Some(account[0].to_string());
        if !account[1].is_empty() {
            balance.bic = Some(account[1].to_string());
        }
        balance.bank_code = Some(account[3].to_string());
        balance.account_type = Some(parts[2].to_string());
        balance.currency = Some(parts[3].to_string());
    } else if account.len() == 2 {
        balance.iban = Some(account[0].to_string());
        balance.bic = Some(account[1].to_string());
    }

    let booked: Vec<&str> = parts[4].split(':').collect();
    if booked.len() < 2 {
        return Err(ClientError::Bank(format!("malformed balance group: {}", parts[4])));
    }
    balance.balance = signed_amount(booked[0], booked[1])?;

    if let Some(marked) = parts.get(5).filter(|p| p.contains(':')) {
        let marked: Vec<&str> = marked.split(':').collect();
        balance.marked_transactions = Some(signed_amount(marked[0], marked[1])?);
    }
    if let Some(line) = parts.get(6).filter(|p| p.contains(':')) {
        balance.credit_line = parse_amount(line.split(':').next().unwrap_or("")).ok();
    }
    if let Some(avail) = parts.get(7).filter(|p| p.contains(':')) {
        balance.available_balance = parse_amount(avail.split(':').next().unwrap_or("")).ok();
    }

    Ok(balance)
}

/// Text of the last HIRMS result field, used as the human-readable outcome.
fn last_result_text(raw: &str) -> String {
    let Some(at) = raw.find("HIRMS") else {
        return String::new();
    };
    let hirms = &raw[at + "HIRMS".len()..];
    let hirms = hirms.split('\'').next().unwrap_or(hirms);
    hirms.rsplit(':').next().unwrap_or("").to_string()
}

fn signed_amount(side: &str, amount: &str) -> Result<f64, ClientError> {
    let value = parse_amount(amount)?;
    Ok(if side == "D" { -value } else { value })
}

/// German decimal notation, with a tolerated trailing comma.
fn parse_amount(amount: &str) -> Result<f64, ClientError> {
    amount
        .trim_end_matches(',')
        .replace(',', ".")
        .parse()
        .map_err(|_| ClientError::Bank(format!("unparsable amount: {amount}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::NoTanSource;
    use crate::machine::{Transaction, TransactionState};
    use crate::operations::testkit::scripted_session;

    const BALANCE_RESPONSE: &str = "HNHBK:1:3+000000000270+300+DIALOG5+2+DIALOG5:2'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:3+0020::Der Auftrag wurde ausgef\u{fc}hrt.'\
HISAL:4:5:3+760794644::280:76550000+Girokonto+EUR+C:1234,56:EUR:20260829+D:17,89:EUR:20260829+2000,:EUR+3216,67:EUR'\
HNHBS:5:1+2'";

    #[tokio::test]
    async fn test_balance_is_parsed_from_hisal() {
        let (mut session, exchange) = scripted_session(vec![BALANCE_RESPONSE]);
        session.context_mut().dialog.balance_version = Some(5);

        // drive the concrete op directly so the payload stays accessible
        let mut op = BalanceOperation::new();
        let outcome = op.execute(&mut session).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Done(_)));

        let balance = op.balance().unwrap();
        assert_eq!(balance.balance, 1234.56);
        assert_eq!(balance.marked_transactions, Some(-17.89));
        assert_eq!(balance.credit_line, Some(2000.0));
        assert_eq!(balance.available_balance, Some(3216.67));
        assert_eq!(balance.account_number.as_deref(), Some("760794644"));
        assert_eq!(balance.bank_code.as_deref(), Some("76550000"));
        assert_eq!(balance.currency.as_deref(), Some("EUR"));

        let requests = exchange.requests.lock().unwrap();
        assert!(requests[0].contains("HKSAL:3:5+760794644::280:76550000+N'"));
    }

    #[tokio::test]
    async fn test_balance_through_state_machine() {
        let (mut session, _exchange) = scripted_session(vec![BALANCE_RESPONSE]);
        session.context_mut().dialog.balance_version = Some(5);
        let mut tx = Transaction::new(Box::new(BalanceOperation::new()));
        let state = tx.run(&mut session, &NoTanSource).await.unwrap();
        assert_eq!(state, TransactionState::Finished);
        assert!(tx.result().unwrap().is_success());
    }

    #[tokio::test]
    async fn test_iban_addressing_from_version_seven() {
        let (mut session, exchange) = scripted_session(vec![BALANCE_RESPONSE]);
        session.context_mut().dialog.balance_version = Some(7);
        let mut op = BalanceOperation::new();
        op.execute(&mut session).await.unwrap();
        let requests = exchange.requests.lock().unwrap();
        assert!(requests[0].contains("HKSAL:3:7+DE07765500000760794644:BYLADEM1ANS+N'"));
    }

    #[test]
    fn test_debit_balance_is_negative() {
        let raw = "HIRMS:3:2:3+0020::Auftrag ausgef\u{fc}hrt'\
HISAL:4:5:3+DE07765500000760794644:BYLADEM1ANS+Girokonto+EUR+D:50,00:EUR:20260829'";
        let balance = parse_balance(raw).unwrap();
        assert_eq!(balance.balance, -50.0);
        assert_eq!(balance.iban.as_deref(), Some("DE07765500000760794644"));
        assert_eq!(balance.bic.as_deref(), Some("BYLADEM1ANS"));
    }

    #[test]
    fn test_failed_balance_carries_bank_text() {
        let raw = "HIRMS:3:2:3+9010::Auftrag abgelehnt'HNHBS:4:1+2'";
        match parse_balance(raw) {
            Err(ClientError::Bank(text)) => assert_eq!(text, "Auftrag abgelehnt"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
