use super::Session;
use crate::driver::protocol::{Command, RequestType, Value};
use crate::error::{DriverError, DriverResult};

impl Session {
    pub(crate) fn extract_okay(value: Value) -> DriverResult<()> {
        match value {
            Value::Okay => Ok(()),
            Value::Status(status) if status.eq_ignore_ascii_case("OK") => Ok(()),
            other => Err(unexpected("OK", &other)),
        }
    }

    pub(crate) fn extract_int(value: Value) -> DriverResult<i64> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(unexpected("an integer", &other)),
        }
    }

    pub(crate) fn extract_optional_bytes(value: Value) -> DriverResult<Option<Vec<u8>>> {
        match value {
            Value::Nil => Ok(None),
            Value::Bulk(data) => Ok(Some(data.into_vec())),
            Value::Status(text) => Ok(Some(text.into_bytes())),
            other => Err(unexpected("a bulk string or nil", &other)),
        }
    }

    async fn typed<const N: usize>(
        &self,
        request_type: RequestType,
        args: [&[u8]; N],
    ) -> DriverResult<Value> {
        self.call_command(Command::new(request_type, args)?).await
    }

    pub async fn ping(&self) -> DriverResult<String> {
        match self.typed(RequestType::Ping, []).await? {
            Value::Status(text) => Ok(text),
            Value::Bulk(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
            Value::Okay => Ok("OK".to_string()),
            other => Err(unexpected("PONG", &other)),
        }
    }

    pub async fn echo(&self, message: impl AsRef<[u8]>) -> DriverResult<Option<Vec<u8>>> {
        let value = self.typed(RequestType::Echo, [message.as_ref()]).await?;
        Self::extract_optional_bytes(value)
    }

    pub async fn get(&self, key: impl AsRef<[u8]>) -> DriverResult<Option<Vec<u8>>> {
        let value = self.typed(RequestType::Get, [key.as_ref()]).await?;
        Self::extract_optional_bytes(value)
    }

    pub async fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> DriverResult<()> {
        let reply = self
            .typed(RequestType::Set, [key.as_ref(), value.as_ref()])
            .await?;
        Self::extract_okay(reply)
    }

    /// Set a value with an expiry in seconds (`SET key value EX seconds`).
    pub async fn set_ex(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        seconds: u64,
    ) -> DriverResult<()> {
        let seconds = seconds.to_string();
        let reply = self
            .typed(
                RequestType::Set,
                [key.as_ref(), value.as_ref(), &b"EX"[..], seconds.as_bytes()],
            )
            .await?;
        Self::extract_okay(reply)
    }

    /// Delete keys, returning how many existed.
    pub async fn del<K: AsRef<[u8]>>(&self, keys: &[K]) -> DriverResult<i64> {
        let command = Command::new(RequestType::Del, keys)?;
        Self::extract_int(self.call_command(command).await?)
    }

    pub async fn exists<K: AsRef<[u8]>>(&self, keys: &[K]) -> DriverResult<i64> {
        let command = Command::new(RequestType::Exists, keys)?;
        Self::extract_int(self.call_command(command).await?)
    }

    pub async fn incr(&self, key: impl AsRef<[u8]>) -> DriverResult<i64> {
        Self::extract_int(self.typed(RequestType::Incr, [key.as_ref()]).await?)
    }

    pub async fn incr_by(&self, key: impl AsRef<[u8]>, delta: i64) -> DriverResult<i64> {
        let delta = delta.to_string();
        Self::extract_int(
            self.typed(RequestType::IncrBy, [key.as_ref(), delta.as_bytes()])
                .await?,
        )
    }

    pub async fn decr(&self, key: impl AsRef<[u8]>) -> DriverResult<i64> {
        Self::extract_int(self.typed(RequestType::Decr, [key.as_ref()]).await?)
    }

    pub async fn append(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> DriverResult<i64> {
        Self::extract_int(
            self.typed(RequestType::Append, [key.as_ref(), value.as_ref()])
                .await?,
        )
    }

    pub async fn mget<K: AsRef<[u8]>>(&self, keys: &[K]) -> DriverResult<Vec<Option<Vec<u8>>>> {
        let command = Command::new(RequestType::MGet, keys)?;
        match self.call_command(command).await? {
            Value::Array(items) => items
                .into_iter()
                .map(Self::extract_optional_bytes)
                .collect(),
            other => Err(unexpected("an array", &other)),
        }
    }

    pub async fn mset<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, pairs: &[(K, V)]) -> DriverResult<()> {
        let args = pairs
            .iter()
            .flat_map(|(k, v)| [k.as_ref().to_vec(), v.as_ref().to_vec()]);
        let command = Command::new(RequestType::MSet, args)?;
        Self::extract_okay(self.call_command(command).await?)
    }

    /// Returns true when the timeout was set.
    pub async fn expire(&self, key: impl AsRef<[u8]>, seconds: u64) -> DriverResult<bool> {
        let seconds = seconds.to_string();
        let reply = self
            .typed(RequestType::Expire, [key.as_ref(), seconds.as_bytes()])
            .await?;
        Ok(Self::extract_int(reply)? == 1)
    }

    /// Remaining time to live in seconds; -1 without expiry, -2 when missing.
    pub async fn ttl(&self, key: impl AsRef<[u8]>) -> DriverResult<i64> {
        Self::extract_int(self.typed(RequestType::Ttl, [key.as_ref()]).await?)
    }

    pub async fn info(&self) -> DriverResult<String> {
        let value = self.typed(RequestType::Info, []).await?;
        match Self::extract_optional_bytes(value)? {
            Some(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
            None => Ok(String::new()),
        }
    }
}

fn unexpected(expected: &str, got: &Value) -> DriverError {
    DriverError::UnexpectedResponse(format!("expected {}, got {:?}", expected, got))
}
