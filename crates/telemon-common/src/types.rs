use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Metric kind, which decides how a stored value merges with an incoming one.
///
/// # Examples
///
/// ```
/// use telemon_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Replaced on every write.
    Gauge,
    /// Accumulated on every write.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(ModelError::EmptyKind),
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}

/// Payload of a metric. The variant is the kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

/// Identity of a stored metric, also the body of a JSON lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricIdentity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

impl MetricIdentity {
    /// Storage key for this identity. Fails when the ID is empty.
    pub fn key(&self) -> Result<String> {
        metric_key(&self.id, self.kind)
    }
}

/// A single named reading.
///
/// On the wire a metric is `{"id", "type", "value"}` for gauges and
/// `{"id", "type", "delta"}` for counters; decoding rejects records whose
/// payload field does not match the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricRecord", into = "MetricRecord")]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    pub fn identity(&self) -> MetricIdentity {
        MetricIdentity {
            id: self.id.clone(),
            kind: self.kind(),
        }
    }

    /// Storage key (`<id>:<type>`). Fails when the ID is empty.
    pub fn key(&self) -> Result<String> {
        metric_key(&self.id, self.kind())
    }

    /// Storage key of a metric that is fit to store: the ID is non-empty and
    /// a gauge value is finite. JSON has no encoding for NaN or infinity.
    ///
    /// # Examples
    ///
    /// ```
    /// use telemon_common::types::Metric;
    ///
    /// assert_eq!(Metric::gauge("Alloc", 2.0).checked_key().unwrap(), "Alloc:gauge");
    /// assert!(Metric::gauge("Alloc", f64::NAN).checked_key().is_err());
    /// ```
    pub fn checked_key(&self) -> Result<String> {
        if let MetricValue::Gauge(v) = self.value {
            finite_gauge(v)?;
        }
        self.key()
    }

    /// Builds a metric from its textual parts, as found in an update URL.
    /// Gauge values must be finite.
    ///
    /// # Examples
    ///
    /// ```
    /// use telemon_common::types::{Metric, MetricValue};
    ///
    /// let m = Metric::parse("requests", "counter", "42").unwrap();
    /// assert_eq!(m.value, MetricValue::Counter(42));
    /// assert!(Metric::parse("requests", "counter", "4.2").is_err());
    /// ```
    pub fn parse(id: &str, kind: &str, raw: &str) -> Result<Self> {
        let value = match kind.parse::<MetricKind>()? {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(|| ModelError::InvalidValue {
                    kind: "gauge",
                    raw: raw.to_string(),
                })?,
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| ModelError::InvalidValue {
                    kind: "counter",
                    raw: raw.to_string(),
                })?,
        };
        Ok(Self {
            id: id.to_string(),
            value,
        })
    }
}

/// Builds the storage key for an identity.
pub fn metric_key(id: &str, kind: MetricKind) -> Result<String> {
    if id.is_empty() {
        return Err(ModelError::EmptyId);
    }
    Ok(format!("{id}:{kind}"))
}

fn finite_gauge(v: f64) -> Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ModelError::InvalidValue {
            kind: "gauge",
            raw: v.to_string(),
        })
    }
}

/// Snapshot produced by one poll tick; immutable once queued for delivery.
pub type MetricBatch = Vec<Metric>;

#[derive(Serialize, Deserialize)]
struct MetricRecord {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl TryFrom<MetricRecord> for Metric {
    type Error = ModelError;

    fn try_from(record: MetricRecord) -> Result<Self> {
        let value = match (record.kind.parse::<MetricKind>()?, record.value, record.delta) {
            (MetricKind::Gauge, Some(v), None) => MetricValue::Gauge(finite_gauge(v)?),
            (MetricKind::Counter, None, Some(d)) => MetricValue::Counter(d),
            (MetricKind::Gauge, _, _) => {
                return Err(ModelError::PayloadMismatch {
                    id: record.id,
                    kind: "gauge",
                    field: "value",
                })
            }
            (MetricKind::Counter, _, _) => {
                return Err(ModelError::PayloadMismatch {
                    id: record.id,
                    kind: "counter",
                    field: "delta",
                })
            }
        };
        Ok(Metric {
            id: record.id,
            value,
        })
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        let kind = metric.kind().to_string();
        let (value, delta) = match metric.value {
            MetricValue::Gauge(v) => (Some(v), None),
            MetricValue::Counter(d) => (None, Some(d)),
        };
        MetricRecord {
            id: metric.id,
            kind,
            delta,
            value,
        }
    }
}
