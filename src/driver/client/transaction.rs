use super::Session;
use crate::driver::protocol::{Command, RequestBody, RequestType, Value};
use crate::driver::transaction::Transaction;
use crate::error::DriverResult;

impl Session {
    /// Submit a transaction and wait for its batched reply.
    ///
    /// Returns one result per command in append order, or `None` when the
    /// engine discarded an atomic transaction because a watched key changed.
    /// The transaction records which of the two happened, or that it failed.
    pub async fn exec_transaction(
        &self,
        tx: &mut Transaction,
    ) -> DriverResult<Option<Vec<Value>>> {
        let batch = tx.submit()?;
        tracing::debug!(
            commands = batch.commands.len(),
            atomic = batch.is_atomic,
            "Submitting batch"
        );
        let reply = self.dispatch(RequestBody::Batch(batch)).await;
        tx.complete(reply)
    }

    /// Watch keys for the next transaction submitted on this session.
    pub async fn watch<K: AsRef<[u8]>>(&self, keys: &[K]) -> DriverResult<()> {
        let command = Command::new(RequestType::Watch, keys)?;
        Self::extract_okay(self.call_command(command).await?)
    }

    pub async fn unwatch(&self) -> DriverResult<()> {
        let command = Command::new(RequestType::Unwatch, Vec::<&[u8]>::new())?;
        Self::extract_okay(self.call_command(command).await?)
    }
}
