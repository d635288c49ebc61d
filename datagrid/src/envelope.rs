//! Response envelope shared by every JSON route.

use serde::Serialize;
use serde_json::Value;

/// `{success, errormsg, info, result, data}`
#[derive(Debug, Clone, Serialize)]
pub struct JsonEnvelope {
    pub success: u8,
    pub errormsg: String,
    pub info: String,
    pub result: Value,
    pub data: Value,
}

impl JsonEnvelope {
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            success: 1,
            errormsg: String::new(),
            info: String::new(),
            result: Value::Null,
            data: data.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: 0,
            errormsg: message.into(),
            info: String::new(),
            result: Value::Null,
            data: Value::Null,
        }
    }
}
