//! SEPA direct debit collection (HKDSE). The debit travels as a pain.008
//! document; unlike transfers the schema is not negotiated, banks expect
//! pain.008.002.02 here.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::operations::{attach_tan_request, step_outcome, tan};
use crate::sepa::{self, Mandate, Payment};
use crate::session::Session;

const DEBIT_SCHEMA: &str = "pain.008.002.02";
const DEBIT_URN: &str = "urn?:iso?:std?:iso?:20022?:tech?:xsd?:pain.008.002.02";

pub struct CollectOperation {
    payment: Payment,
    mandate: Mandate,
    collection_date: NaiveDate,
}

impl CollectOperation {
    pub fn new(payment: Payment, mandate: Mandate, collection_date: NaiveDate) -> Self {
        Self {
            payment,
            mandate,
            collection_date,
        }
    }
}

#[async_trait]
impl Operation for CollectOperation {
    fn name(&self) -> &'static str {
        "direct debit"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        let ctx = session.context();
        let xml = sepa::direct_debit(
            DEBIT_SCHEMA,
            &ctx.account_holder,
            &ctx.iban,
            &ctx.bic,
            &self.payment,
            &self.mandate,
            self.collection_date,
        );
        let mut segments = vec![format!(
            "HKDSE:3:1+{}:{}+{DEBIT_URN}+@{}@{xml}'",
            ctx.iban,
            ctx.bic,
            xml.chars().count(),
        )];
        attach_tan_request(ctx, "HKDSE", &mut segments);
        let result = session.send(&segments, None).await?;
        Ok(step_outcome(session, result))
    }

    async fn confirm(
        &mut self,
        session: &mut Session,
        tan_value: &str,
    ) -> Result<StepOutcome, ClientError> {
        let result = tan::confirm(session, tan_value).await?;
        Ok(StepOutcome::Done(result))
    }
}
