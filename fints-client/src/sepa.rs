//! Minimal SEPA pain payload generation for the order segments. Only the
//! elements German banks require are emitted; the document is kept on one
//! line and free of `'` so it can travel inside a segment unescaped.

use chrono::{NaiveDate, Utc};

/// One credit transfer or direct debit position.
#[derive(Debug, Clone)]
pub struct Payment {
    pub recipient: String,
    pub iban: String,
    pub bic: String,
    pub amount: f64,
    pub purpose: String,
}

/// Mandate data a direct debit must reference.
#[derive(Debug, Clone)]
pub struct Mandate {
    pub creditor_id: String,
    pub mandate_id: String,
    pub date_of_signature: NaiveDate,
}

/// pain.001 customer credit transfer initiation.
///
/// `schema` is the plain schema id, e.g. "pain.001.003.03". A missing
/// execution date yields the placeholder date banks treat as "as soon as
/// possible".
pub fn credit_transfer(
    schema: &str,
    debtor: &str,
    debtor_iban: &str,
    debtor_bic: &str,
    payments: &[Payment],
    execution_date: Option<NaiveDate>,
) -> String {
    let now = Utc::now();
    let msg_id = now.format("%Y%m%d%H%M%S%3f").to_string();
    let created = now.format("%Y-%m-%dT%H:%M:%S").to_string();
    let exec = execution_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1999-01-01".to_string());
    let control_sum = format_amount(payments.iter().map(|p| p.amount).sum());

    let mut transactions = String::new();
    for p in payments {
        transactions.push_str(&format!(
            "<CdtTrfTxInf><PmtId><EndToEndId>NOTPROVIDED</EndToEndId></PmtId>\
             <Amt><InstdAmt Ccy=\"EUR\">{amount}</InstdAmt></Amt>\
             <CdtrAgt><FinInstnId><BIC>{bic}</BIC></FinInstnId></CdtrAgt>\
             <Cdtr><Nm>{name}</Nm></Cdtr>\
             <CdtrAcct><Id><IBAN>{iban}</IBAN></Id></CdtrAcct>\
             <RmtInf><Ustrd>{purpose}</Ustrd></RmtInf></CdtTrfTxInf>",
            amount = format_amount(p.amount),
            bic = xml_escape(&p.bic),
            name = xml_escape(&p.recipient),
            iban = xml_escape(&p.iban),
            purpose = xml_escape(&p.purpose),
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <Document xmlns=\"urn:iso:std:iso:20022:tech:xsd:{schema}\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <CstmrCdtTrfInitn>\
         <GrpHdr><MsgId>{msg_id}</MsgId><CreDtTm>{created}</CreDtTm>\
         <NbOfTxs>{count}</NbOfTxs><CtrlSum>{control_sum}</CtrlSum>\
         <InitgPty><Nm>{debtor}</Nm></InitgPty></GrpHdr>\
         <PmtInf><PmtInfId>{msg_id}-1</PmtInfId><PmtMtd>TRF</PmtMtd>\
         <NbOfTxs>{count}</NbOfTxs><CtrlSum>{control_sum}</CtrlSum>\
         <PmtTpInf><SvcLvl><Cd>SEPA</Cd></SvcLvl></PmtTpInf>\
         <ReqdExecDt>{exec}</ReqdExecDt>\
         <Dbtr><Nm>{debtor}</Nm></Dbtr>\
         <DbtrAcct><Id><IBAN>{debtor_iban}</IBAN></Id></DbtrAcct>\
         <DbtrAgt><FinInstnId><BIC>{debtor_bic}</BIC></FinInstnId></DbtrAgt>\
         <ChrgBr>SLEV</ChrgBr>\
         {transactions}\
         </PmtInf></CstmrCdtTrfInitn></Document>",
        count = payments.len(),
        debtor = xml_escape(debtor),
        debtor_iban = xml_escape(debtor_iban),
        debtor_bic = xml_escape(debtor_bic),
    )
}

/// pain.008 direct debit initiation for a single position.
pub fn direct_debit(
    schema: &str,
    creditor: &str,
    creditor_iban: &str,
    creditor_bic: &str,
    payment: &Payment,
    mandate: &Mandate,
    collection_date: NaiveDate,
) -> String {
    let now = Utc::now();
    let msg_id = now.format("%Y%m%d%H%M%S%3f").to_string();
    let created = now.format("%Y-%m-%dT%H:%M:%S").to_string();
    let amount = format_amount(payment.amount);

    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <Document xmlns=\"urn:iso:std:iso:20022:tech:xsd:{schema}\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <CstmrDrctDbtInitn>\
         <GrpHdr><MsgId>{msg_id}</MsgId><CreDtTm>{created}</CreDtTm>\
         <NbOfTxs>1</NbOfTxs><CtrlSum>{amount}</CtrlSum>\
         <InitgPty><Nm>{creditor}</Nm></InitgPty></GrpHdr>\
         <PmtInf><PmtInfId>{msg_id}-1</PmtInfId><PmtMtd>DD</PmtMtd>\
         <NbOfTxs>1</NbOfTxs><CtrlSum>{amount}</CtrlSum>\
         <PmtTpInf><SvcLvl><Cd>SEPA</Cd></SvcLvl><LclInstrm><Cd>CORE</Cd></LclInstrm>\
         <SeqTp>OOFF</SeqTp></PmtTpInf>\
         <ReqdColltnDt>{collection}</ReqdColltnDt>\
         <Cdtr><Nm>{creditor}</Nm></Cdtr>\
         <CdtrAcct><Id><IBAN>{creditor_iban}</IBAN></Id></CdtrAcct>\
         <CdtrAgt><FinInstnId><BIC>{creditor_bic}</BIC></FinInstnId></CdtrAgt>\
         <ChrgBr>SLEV</ChrgBr>\
         <CdtrSchmeId><Id><PrvtId><Othr><Id>{creditor_id}</Id>\
         <SchmeNm><Prtry>SEPA</Prtry></SchmeNm></Othr></PrvtId></Id></CdtrSchmeId>\
         <DrctDbtTxInf><PmtId><EndToEndId>NOTPROVIDED</EndToEndId></PmtId>\
         <InstdAmt Ccy=\"EUR\">{amount}</InstdAmt>\
         <DrctDbtTx><MndtRltdInf><MndtId>{mandate_id}</MndtId>\
         <DtOfSgntr>{signed}</DtOfSgntr></MndtRltdInf></DrctDbtTx>\
         <DbtrAgt><FinInstnId><BIC>{debtor_bic}</BIC></FinInstnId></DbtrAgt>\
         <Dbtr><Nm>{debtor}</Nm></Dbtr>\
         <DbtrAcct><Id><IBAN>{debtor_iban}</IBAN></Id></DbtrAcct>\
         <RmtInf><Ustrd>{purpose}</Ustrd></RmtInf></DrctDbtTxInf>\
         </PmtInf></CstmrDrctDbtInitn></Document>",
        creditor = xml_escape(creditor),
        creditor_iban = xml_escape(creditor_iban),
        creditor_bic = xml_escape(creditor_bic),
        creditor_id = xml_escape(&mandate.creditor_id),
        mandate_id = xml_escape(&mandate.mandate_id),
        signed = mandate.date_of_signature.format("%Y-%m-%d"),
        collection = collection_date.format("%Y-%m-%d"),
        debtor = xml_escape(&payment.recipient),
        debtor_iban = xml_escape(&payment.iban),
        debtor_bic = xml_escape(&payment.bic),
        purpose = xml_escape(&payment.purpose),
    )
}

/// XML decimal with two places and a dot separator.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Wire decimal with a comma separator, as HBCI amount fields expect.
pub fn format_wire_amount(amount: f64) -> String {
    format!("{amount:.2}").replace('.', ",")
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment {
            recipient: "Max & Erika M\u{fc}ller".into(),
            iban: "DE22600501010003456789".into(),
            bic: "SOLADEST600".into(),
            amount: 10.0,
            purpose: "Rechnung 4711".into(),
        }
    }

    #[test]
    fn test_credit_transfer_structure() {
        let xml = credit_transfer(
            "pain.001.003.03",
            "Erika Mustermann",
            "DE07765500000760794644",
            "BYLADEM1ANS",
            &[payment()],
            None,
        );
        assert!(xml.contains("urn:iso:std:iso:20022:tech:xsd:pain.001.003.03"));
        assert!(xml.contains("<InstdAmt Ccy=\"EUR\">10.00</InstdAmt>"));
        assert!(xml.contains("<Nm>Max &amp; Erika M\u{fc}ller</Nm>"));
        assert!(xml.contains("<ReqdExecDt>1999-01-01</ReqdExecDt>"));
        assert!(!xml.contains('\''));
    }

    #[test]
    fn test_terminated_transfer_carries_execution_date() {
        let date = NaiveDate::from_ymd_opt(2026, 9, 15).unwrap();
        let xml = credit_transfer(
            "pain.001.003.03",
            "Erika Mustermann",
            "DE07765500000760794644",
            "BYLADEM1ANS",
            &[payment()],
            Some(date),
        );
        assert!(xml.contains("<ReqdExecDt>2026-09-15</ReqdExecDt>"));
    }

    #[test]
    fn test_collective_control_sum() {
        let mut second = payment();
        second.amount = 5.5;
        let xml = credit_transfer(
            "pain.001.003.03",
            "Erika Mustermann",
            "DE07765500000760794644",
            "BYLADEM1ANS",
            &[payment(), second],
            None,
        );
        assert!(xml.contains("<NbOfTxs>2</NbOfTxs>"));
        assert!(xml.contains("<CtrlSum>15.50</CtrlSum>"));
    }

    #[test]
    fn test_direct_debit_references_mandate() {
        let mandate = Mandate {
            creditor_id: "DE98ZZZ09999999999".into(),
            mandate_id: "MANDAT-42".into(),
            date_of_signature: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        };
        let xml = direct_debit(
            "pain.008.002.02",
            "Erika Mustermann",
            "DE07765500000760794644",
            "BYLADEM1ANS",
            &payment(),
            &mandate,
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        );
        assert!(xml.contains("<MndtId>MANDAT-42</MndtId>"));
        assert!(xml.contains("<DtOfSgntr>2025-03-01</DtOfSgntr>"));
        assert!(xml.contains("<ReqdColltnDt>2026-09-01</ReqdColltnDt>"));
        assert!(xml.contains("DE98ZZZ09999999999"));
    }

    #[test]
    fn test_wire_amount_uses_comma() {
        assert_eq!(format_wire_amount(1234.5), "1234,50");
        assert_eq!(format_amount(1234.5), "1234.50");
    }
}
