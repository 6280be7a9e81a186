//! A session binds a connection context to a transport and carries whole
//! messages across it: assemble, exchange, classify.

use fints_core::{ConnectionContext, DialogResult, SegmentBuilder, assemble_request, classify};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::transport::Exchange;

pub struct Session {
    ctx: ConnectionContext,
    transport: Box<dyn Exchange>,
}

impl Session {
    pub fn new(ctx: ConnectionContext, transport: Box<dyn Exchange>) -> Self {
        Self { ctx, transport }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ConnectionContext {
        &mut self.ctx
    }

    pub fn into_context(self) -> ConnectionContext {
        self.ctx
    }

    /// One round trip: wrap the business segments, exchange, fold the
    /// response back into the dialog state and return the classified
    /// result.
    pub async fn send(
        &mut self,
        segments: &[String],
        tan: Option<&str>,
    ) -> Result<DialogResult, ClientError> {
        let message = assemble_request(&self.ctx, segments, tan)?;
        let body = self.transport.exchange(&self.ctx.url, &message).await?;
        let result = classify(&mut self.ctx, &body)?;
        debug!(
            success = result.is_success(),
            sca = result.is_sca_required(),
            codes = %result
                .messages()
                .iter()
                .map(|m| m.code.as_str())
                .collect::<Vec<_>>()
                .join(","),
            "response classified"
        );
        Ok(result)
    }

    /// Close the current dialog with HKEND and drop its state. Safe to
    /// call without an open dialog; the bank answers with a warning, not
    /// an error.
    pub async fn end_dialog(&mut self) -> Result<DialogResult, ClientError> {
        let dialog_id = self.ctx.dialog.dialog_id_or_new().to_string();
        let segment = SegmentBuilder::new("HKEND", 3, 1).field(&dialog_id).finish();
        let result = self.send(&[segment], None).await?;
        info!(dialog_id, "dialog closed");
        self.ctx.reset_dialog();
        Ok(result)
    }
}
