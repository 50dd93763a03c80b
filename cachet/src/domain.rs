/// How a write treats an existing live entry under the same key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Upsert.
    #[default]
    Always,
    /// Fail with `KeyAlreadyExists` when a live entry is present.
    IfAbsent,
}

impl WriteMode {
    pub fn from_error_if_exists(error_if_exists: bool) -> Self {
        if error_if_exists {
            WriteMode::IfAbsent
        } else {
            WriteMode::Always
        }
    }
}

pub mod response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Status {
        Ok,
        Fail,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum ReadReason {
        Unknown,
        KeyDoesNotExist,
        Timeout,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum WriteReason {
        Unknown,
        Timeout,
    }

    /// Outcome of a read. `value` is only populated when `status` is `Ok`.
    #[derive(Clone, Debug, PartialEq)]
    pub struct ReadResult<V> {
        pub status: Status,
        pub reason: Option<ReadReason>,
        pub value: Option<V>,
    }

    impl<V> ReadResult<V> {
        pub fn ok(value: V) -> Self {
            Self {
                status: Status::Ok,
                reason: None,
                value: Some(value),
            }
        }

        pub fn fail(reason: ReadReason) -> Self {
            Self {
                status: Status::Fail,
                reason: Some(reason),
                value: None,
            }
        }

        pub fn missing() -> Self {
            Self::fail(ReadReason::KeyDoesNotExist)
        }

        pub fn is_ok(&self) -> bool {
            self.status == Status::Ok
        }

        pub fn is_timeout(&self) -> bool {
            self.reason == Some(ReadReason::Timeout)
        }

        pub fn into_value(self) -> Option<V> {
            self.value
        }

        pub fn map<U, F>(self, f: F) -> ReadResult<U>
        where
            F: FnOnce(V) -> U,
        {
            ReadResult {
                status: self.status,
                reason: self.reason,
                value: self.value.map(f),
            }
        }

        pub fn try_map<U, E, F>(self, f: F) -> Result<ReadResult<U>, E>
        where
            F: FnOnce(V) -> Result<U, E>,
        {
            Ok(ReadResult {
                status: self.status,
                reason: self.reason,
                value: self.value.map(f).transpose()?,
            })
        }
    }

    /// Outcome of a write.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WriteResult {
        pub status: Status,
        pub reason: Option<WriteReason>,
    }

    impl WriteResult {
        pub fn ok() -> Self {
            Self {
                status: Status::Ok,
                reason: None,
            }
        }

        pub fn fail(reason: WriteReason) -> Self {
            Self {
                status: Status::Fail,
                reason: Some(reason),
            }
        }

        pub fn is_ok(&self) -> bool {
            self.status == Status::Ok
        }

        pub fn is_timeout(&self) -> bool {
            self.reason == Some(WriteReason::Timeout)
        }
    }

    /// Outcome of a single or batch delete. Deleting an absent key is `Ok`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeleteResult {
        pub status: Status,
        pub reason: Option<WriteReason>,
    }

    impl DeleteResult {
        pub fn ok() -> Self {
            Self {
                status: Status::Ok,
                reason: None,
            }
        }

        pub fn fail(reason: WriteReason) -> Self {
            Self {
                status: Status::Fail,
                reason: Some(reason),
            }
        }

        pub fn is_ok(&self) -> bool {
            self.status == Status::Ok
        }

        pub fn is_timeout(&self) -> bool {
            self.reason == Some(WriteReason::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::response::*;
    use super::*;

    #[test]
    fn missing_read_carries_reason_and_no_value() {
        let result: ReadResult<String> = ReadResult::missing();
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.reason, Some(ReadReason::KeyDoesNotExist));
        assert!(result.into_value().is_none());
    }

    #[test]
    fn try_map_propagates_error() {
        let result = ReadResult::ok("x".to_string());
        let mapped: Result<ReadResult<u8>, &str> = result.try_map(|_| Err("bad"));
        assert_eq!(mapped, Err("bad"));

        let timeout: ReadResult<String> = ReadResult::fail(ReadReason::Timeout);
        let mapped: Result<ReadResult<u8>, &str> = timeout.try_map(|_| Err("unreachable"));
        assert!(mapped.unwrap().is_timeout());
    }

    #[test]
    fn write_mode_from_flag() {
        assert_eq!(WriteMode::from_error_if_exists(true), WriteMode::IfAbsent);
        assert_eq!(WriteMode::from_error_if_exists(false), WriteMode::Always);
    }
}
