//! Transaction batching
//!
//! A [`Transaction`] collects commands in call order and is turned into one
//! [`Batch`] request exactly once. After submission it only records how the
//! batch ended.

use super::protocol::{Batch, Command, RequestType, Value};
use crate::error::{DriverError, DriverResult};

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting commands
    Building,
    /// Sent; waiting for the batched reply
    Submitted,
    /// Executed; carries one result per command
    Resolved,
    /// Discarded by the engine because a watched key changed
    Aborted,
    /// Rejected, or the connection failed before the reply
    Failed,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    commands: Vec<Command>,
    state: TransactionState,
    is_atomic: bool,
    raise_on_error: bool,
}

impl Transaction {
    /// Empty atomic transaction (MULTI/EXEC semantics)
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            state: TransactionState::Building,
            is_atomic: true,
            raise_on_error: true,
        }
    }

    /// Empty non-atomic batch: sent together, executed independently
    pub fn pipeline() -> Self {
        Self {
            is_atomic: false,
            ..Self::new()
        }
    }

    /// Whether a failed element fails the whole batch (default) or is
    /// returned in place among the results.
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    pub fn append_command(&mut self, command: Command) -> DriverResult<&mut Self> {
        self.ensure_building(&command.name())?;
        self.commands.push(command);
        Ok(self)
    }

    /// Append a command by name, e.g. `tx.append("SET", ["k", "v"])?`.
    pub fn append<I, A>(&mut self, name: &str, args: I) -> DriverResult<&mut Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.ensure_building(name)?;
        let command = Command::from_name(name, args)?;
        self.append_command(command)
    }

    pub fn get(&mut self, key: impl AsRef<[u8]>) -> DriverResult<&mut Self> {
        self.append_command(Command::new(RequestType::Get, [key.as_ref()])?)
    }

    pub fn set(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> DriverResult<&mut Self> {
        self.append_command(Command::new(
            RequestType::Set,
            [key.as_ref(), value.as_ref()],
        )?)
    }

    pub fn del(&mut self, key: impl AsRef<[u8]>) -> DriverResult<&mut Self> {
        self.append_command(Command::new(RequestType::Del, [key.as_ref()])?)
    }

    pub fn incr(&mut self, key: impl AsRef<[u8]>) -> DriverResult<&mut Self> {
        self.append_command(Command::new(RequestType::Incr, [key.as_ref()])?)
    }

    /// Freeze the transaction and produce the batch to send.
    ///
    /// Only succeeds once; the commands stay readable afterwards.
    pub fn submit(&mut self) -> DriverResult<Batch> {
        if self.state != TransactionState::Building {
            return Err(DriverError::State(format!(
                "transaction already submitted (state {:?})",
                self.state
            )));
        }
        self.state = TransactionState::Submitted;
        Ok(Batch {
            is_atomic: self.is_atomic,
            raise_on_error: self.raise_on_error,
            commands: self.commands.clone(),
        })
    }

    /// Interpret the batched reply and record the final state.
    ///
    /// `Ok(None)` is the aborted outcome of an atomic transaction.
    pub(crate) fn complete(
        &mut self,
        reply: DriverResult<Value>,
    ) -> DriverResult<Option<Vec<Value>>> {
        let outcome = reply.and_then(|value| self.interpret(value));
        self.state = match &outcome {
            Ok(Some(_)) => TransactionState::Resolved,
            Ok(None) => TransactionState::Aborted,
            Err(_) => TransactionState::Failed,
        };
        outcome
    }

    fn interpret(&self, value: Value) -> DriverResult<Option<Vec<Value>>> {
        match value {
            Value::Nil if self.is_atomic => Ok(None),
            Value::Array(results) => {
                if results.len() != self.commands.len() {
                    return Err(DriverError::UnexpectedResponse(format!(
                        "batch of {} commands answered with {} results",
                        self.commands.len(),
                        results.len()
                    )));
                }
                if self.raise_on_error {
                    if let Some(err) = results.iter().find_map(|v| match v {
                        Value::Error(err) => Some(err.clone()),
                        _ => None,
                    }) {
                        return Err(DriverError::Server(err));
                    }
                }
                Ok(Some(results))
            }
            other => Err(DriverError::UnexpectedResponse(format!(
                "batch answered with {:?}",
                other
            ))),
        }
    }

    fn ensure_building(&self, name: &str) -> DriverResult<()> {
        if self.state != TransactionState::Building {
            return Err(DriverError::State(format!(
                "cannot append {} to a transaction in state {:?}",
                name, self.state
            )));
        }
        Ok(())
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_atomic(&self) -> bool {
        self.is_atomic
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
