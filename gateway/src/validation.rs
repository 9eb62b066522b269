use resolver::types::{Rank, UserId};
use serde_json::{Map, Value};

pub const MIN_RANK: i128 = 1;
pub const MAX_RANK: i128 = 254;

const FIELDS: [&str; 2] = ["userId", "rank"];
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("Invalid JSON body: {0}")]
    MalformedBody(String),

    #[error("\"value\" must be of type object")]
    NotAnObject,

    #[error("\"{0}\" is required")]
    Missing(&'static str),

    #[error("\"{0}\" must be a number")]
    NotANumber(&'static str),

    #[error("\"{0}\" must be an integer")]
    NotAnInteger(&'static str),

    #[error("\"userId\" must be a positive number")]
    NonPositiveUserId,

    #[error("\"{0}\" is out of range")]
    OutOfRange(&'static str),

    #[error("\"rank\" must be between 1 and 254")]
    RankOutOfRange,

    #[error("\"{0}\" is not allowed")]
    NotAllowed(String),
}

/// A validated `PATCH /update-rank` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankChangeRequest {
    pub user_id: UserId,
    pub rank: Rank,
}

impl RankChangeRequest {
    /// Numbers and numeric strings are both accepted, as are integral floats
    /// such as `5.0`. Fractional values are rejected even when they would
    /// round to a valid id. Keys other than `userId` and `rank` are rejected
    /// once both fields are valid.
    pub fn from_json(body: &Value) -> Result<Self, RequestValidationError> {
        let body = body.as_object().ok_or(RequestValidationError::NotAnObject)?;

        let user_id = integer_field(body, "userId")?;
        if user_id <= 0 {
            return Err(RequestValidationError::NonPositiveUserId);
        }
        let user_id =
            UserId::try_from(user_id).map_err(|_| RequestValidationError::OutOfRange("userId"))?;

        let rank = integer_field(body, "rank")?;
        if !(MIN_RANK..=MAX_RANK).contains(&rank) {
            return Err(RequestValidationError::RankOutOfRange);
        }
        let rank = Rank::try_from(rank).map_err(|_| RequestValidationError::RankOutOfRange)?;

        if let Some(key) = body.keys().find(|key| !FIELDS.contains(&key.as_str())) {
            return Err(RequestValidationError::NotAllowed(key.clone()));
        }

        Ok(RankChangeRequest { user_id, rank })
    }
}

fn integer_field(body: &Map<String, Value>, name: &'static str) -> Result<i128, RequestValidationError> {
    match body.get(name) {
        None | Some(Value::Null) => Err(RequestValidationError::Missing(name)),
        Some(Value::Number(number)) => {
            if let Some(n) = number.as_i64() {
                Ok(n.into())
            } else if let Some(n) = number.as_u64() {
                Ok(n.into())
            } else {
                integral_float(number.as_f64(), name)
            }
        }
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            if let Ok(n) = raw.parse::<i128>() {
                Ok(n)
            } else if raw.parse::<f64>().is_ok_and(f64::is_finite) {
                Err(RequestValidationError::NotAnInteger(name))
            } else {
                Err(RequestValidationError::NotANumber(name))
            }
        }
        Some(_) => Err(RequestValidationError::NotANumber(name)),
    }
}

fn integral_float(value: Option<f64>, name: &'static str) -> Result<i128, RequestValidationError> {
    match value {
        Some(f) if f.is_finite() && f.fract() == 0.0 => {
            if f.abs() > MAX_SAFE_INTEGER {
                Err(RequestValidationError::OutOfRange(name))
            } else {
                Ok(f as i128)
            }
        }
        _ => Err(RequestValidationError::NotAnInteger(name)),
    }
}
