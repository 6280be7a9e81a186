//! Standing orders: create (HKCDE), modify (HKCDN), delete (HKCDL) and
//! list (HKCDB). Standing orders always speak pain.001.001.03 regardless
//! of the negotiated transfer schema; the execution schedule travels in a
//! separate field next to the document.

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use tracing::info;

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::operations::{attach_tan_request, step_outcome, tan};
use crate::sepa::{self, Payment};
use crate::session::Session;

const ORDER_SCHEMA: &str = "pain.001.001.03";
const ORDER_URN: &str = "urn?:iso?:std?:iso?:20022?:tech?:xsd?:pain.001.001.03";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Weekly,
    Monthly,
}

impl TimeUnit {
    fn wire(&self) -> char {
        match self {
            TimeUnit::Weekly => 'W',
            TimeUnit::Monthly => 'M',
        }
    }

    fn from_wire(c: &str) -> Self {
        if c == "W" { TimeUnit::Weekly } else { TimeUnit::Monthly }
    }
}

/// Execution schedule of a standing order. `rota` is the interval count
/// (every N weeks/months), `execution_day` the day within the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub first_execution: NaiveDate,
    pub time_unit: TimeUnit,
    pub rota: String,
    pub execution_day: u32,
}

impl Schedule {
    fn wire(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.first_execution.format("%Y%m%d"),
            self.time_unit.wire(),
            self.rota,
            self.execution_day
        )
    }
}

/// One standing order as reported by the bank.
#[derive(Debug, Clone)]
pub struct StandingOrder {
    pub order_id: String,
    pub recipient: Option<String>,
    pub iban: Option<String>,
    pub amount: Option<f64>,
    pub purpose: Option<String>,
    pub schedule: Schedule,
    /// The bank's pain document verbatim, for callers that need more.
    pub raw_pain: String,
}

pub enum StandingOrderAction {
    Create {
        payment: Payment,
        schedule: Schedule,
    },
    Modify {
        order_id: String,
        payment: Payment,
        schedule: Schedule,
    },
    Delete {
        order_id: String,
        payment: Payment,
        schedule: Schedule,
    },
    List,
}

pub struct StandingOrderOperation {
    action: StandingOrderAction,
    orders: Vec<StandingOrder>,
}

impl StandingOrderOperation {
    pub fn new(action: StandingOrderAction) -> Self {
        Self {
            action,
            orders: Vec::new(),
        }
    }

    /// Orders reported by a finished list action.
    pub fn orders(&self) -> &[StandingOrder] {
        &self.orders
    }

    pub fn into_orders(self) -> Vec<StandingOrder> {
        self.orders
    }

    fn order_segment(&self, session: &Session) -> String {
        let ctx = session.context();
        let address = format!("{}:{}", ctx.iban, ctx.bic);
        let document = |payment: &Payment, schedule: &Schedule| {
            let xml = sepa::credit_transfer(
                ORDER_SCHEMA,
                &ctx.account_holder,
                &ctx.iban,
                &ctx.bic,
                std::slice::from_ref(payment),
                Some(schedule.first_execution),
            );
            format!("@{}@{xml}", xml.chars().count())
        };
        match &self.action {
            StandingOrderAction::List => {
                format!("HKCDB:3:1+{address}+{ORDER_URN}'")
            }
            StandingOrderAction::Create { payment, schedule } => format!(
                "HKCDE:3:1+{address}+{ORDER_URN}+{}+{}'",
                document(payment, schedule),
                schedule.wire()
            ),
            StandingOrderAction::Modify {
                order_id,
                payment,
                schedule,
            } => format!(
                "HKCDN:3:1+{address}+{ORDER_URN}+{}++{order_id}+{}'",
                document(payment, schedule),
                schedule.wire()
            ),
            StandingOrderAction::Delete {
                order_id,
                payment,
                schedule,
            } => format!(
                "HKCDL:3:1+{address}+{ORDER_URN}+{}++{order_id}+{}'",
                document(payment, schedule),
                schedule.wire()
            ),
        }
    }

    fn code(&self) -> &'static str {
        match self.action {
            StandingOrderAction::Create { .. } => "HKCDE",
            StandingOrderAction::Modify { .. } => "HKCDN",
            StandingOrderAction::Delete { .. } => "HKCDL",
            StandingOrderAction::List => "HKCDB",
        }
    }

    fn absorb(&mut self, raw: &str) {
        if matches!(self.action, StandingOrderAction::List) {
            self.orders = parse_standing_orders(raw);
            info!(count = self.orders.len(), "standing orders received");
        }
    }
}

#[async_trait]
impl Operation for StandingOrderOperation {
    fn name(&self) -> &'static str {
        "standing order"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        let mut segments = vec![self.order_segment(session)];
        attach_tan_request(session.context(), self.code(), &mut segments);
        let result = session.send(&segments, None).await?;
        let outcome = step_outcome(session, result);
        if let StepOutcome::Done(result) = &outcome {
            if result.is_success() {
                self.absorb(result.raw());
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
            self.absorb(result.raw());
        }
        Ok(StepOutcome::Done(result))
    }
}

/// HICDB answers: one segment per order, each with the pain document, the
/// order id and the schedule group.
fn parse_standing_orders(raw: &str) -> Vec<StandingOrder> {
    let rx = Regex::new(
        r"(?s)HICDB.+?(?P<xml><\?xml.+?</Document>)\+(?P<order>.*?)\+(?P<first>\d*):(?P<unit>[MW]):(?P<rota>\d+):(?P<day>\d+)",
    )
    .expect("static pattern");

    rx.captures_iter(raw)
        .filter_map(|caps| {
            let first = NaiveDate::parse_from_str(&caps["first"], "%Y%m%d").ok()?;
            let execution_day: u32 = caps["day"].parse().ok()?;
            if execution_day == 0 {
                return None;
            }
            let xml = caps["xml"].to_string();
            let creditor = xml_block(&xml, "Cdtr").and_then(|b| xml_value(&b, "Nm"));
            let iban = xml_block(&xml, "CdtrAcct").and_then(|b| xml_value(&b, "IBAN"));
            Some(StandingOrder {
                order_id: caps["order"].to_string(),
                recipient: creditor,
                iban,
                amount: xml_value(&xml, "InstdAmt").and_then(|v| v.parse().ok()),
                purpose: xml_value(&xml, "Ustrd"),
                schedule: Schedule {
                    first_execution: first,
                    time_unit: TimeUnit::from_wire(&caps["unit"]),
                    rota: caps["rota"].to_string(),
                    execution_day,
                },
                raw_pain: xml,
            })
        })
        .collect()
}

/// First `<tag>...</tag>` block including nested elements.
fn xml_block(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!("(?s)<{tag}>(?P<inner>.+?)</{tag}>");
    let rx = Regex::new(&pattern).ok()?;
    rx.captures(xml).map(|caps| caps["inner"].to_string())
}

/// Text content of the first `<tag>` element.
fn xml_value(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!("(?s)<{tag}[^>]*>(?P<value>[^<]+)</{tag}>");
    let rx = Regex::new(&pattern).ok()?;
    rx.captures(xml).map(|caps| caps["value"].trim().to_string())
}
