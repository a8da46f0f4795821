use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position fix reported by a GPS source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters; smaller is better.
    pub accuracy: f64,
    pub source: String,
}

impl GpsFix {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, source: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            source: source.into(),
        }
    }
}

/// Serving-cell descriptor as emitted by the modem parser. Identity fields keep
/// the producer's string form; they are parsed leniently at insert time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServingCell {
    pub cell_id: String,
    pub mcc: String,
    pub mnc: String,
    /// Tracking area code (LTE/NR) or location area code (GSM/UMTS).
    pub tac: String,
    pub technology: String,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default)]
    pub rsrp: i32,
    #[serde(default)]
    pub rsrq: i32,
    #[serde(default)]
    pub sinr: i32,
}

impl ServingCell {
    pub fn new(
        cell_id: impl Into<String>,
        mcc: impl Into<String>,
        mnc: impl Into<String>,
        tac: impl Into<String>,
        technology: impl Into<String>,
    ) -> Self {
        Self {
            cell_id: cell_id.into(),
            mcc: mcc.into(),
            mnc: mnc.into(),
            tac: tac.into(),
            technology: technology.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: SignalMetrics) -> Self {
        self.rssi = signal.rssi;
        self.rsrp = signal.rsrp;
        self.rsrq = signal.rsrq;
        self.sinr = signal.sinr;
        self
    }

    pub fn signal(&self) -> SignalMetrics {
        SignalMetrics {
            rssi: self.rssi,
            rsrp: self.rsrp,
            rsrq: self.rsrq,
            sinr: self.sinr,
        }
    }

    /// Parses the identity fields, substituting zero for anything that is not a
    /// decimal integer. Substituted fields are listed in `fallbacks`.
    pub fn parse(&self) -> ParsedCell {
        let mut fallbacks = Vec::new();
        let mut field = |kind: IdentityField, raw: &str| -> i64 {
            match raw.trim().parse::<i64>() {
                Ok(value) => value,
                Err(_) => {
                    fallbacks.push((kind, raw.to_string()));
                    0
                }
            }
        };
        let key = CellKey {
            cell_id: field(IdentityField::CellId, &self.cell_id),
            mcc: field(IdentityField::Mcc, &self.mcc),
            mnc: field(IdentityField::Mnc, &self.mnc),
            lac: field(IdentityField::Lac, &self.tac),
        };
        ParsedCell {
            key,
            technology: self.technology.trim().to_string(),
            signal: self.signal(),
            fallbacks,
        }
    }
}

/// Signal-quality metrics; zero means the modem did not report the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMetrics {
    pub rssi: i32,
    pub rsrp: i32,
    pub rsrq: i32,
    pub sinr: i32,
}

/// The four-tuple that identifies a cell for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub cell_id: i64,
    pub mcc: i64,
    pub mnc: i64,
    pub lac: i64,
}

impl CellKey {
    pub const fn new(cell_id: i64, mcc: i64, mnc: i64, lac: i64) -> Self {
        Self {
            cell_id,
            mcc,
            mnc,
            lac,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.cell_id, self.mcc, self.mnc, self.lac
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    CellId,
    Mcc,
    Mnc,
    Lac,
}

impl IdentityField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CellId => "cell_id",
            Self::Mcc => "mcc",
            Self::Mnc => "mnc",
            Self::Lac => "lac",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCell {
    pub key: CellKey,
    pub technology: String,
    pub signal: SignalMetrics,
    pub fallbacks: Vec<(IdentityField, String)>,
}

/// Producer input for one insert. `cell` is optional because the producer may
/// hold a fix while the modem has no serving cell registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObservation {
    pub fix: GpsFix,
    pub cell: Option<ServingCell>,
}

impl NewObservation {
    pub fn new(fix: GpsFix, cell: ServingCell) -> Self {
        Self {
            fix,
            cell: Some(cell),
        }
    }
}

/// One persisted GPS + serving-cell measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub source: String,
    pub cell_id: i64,
    pub mcc: i64,
    pub mnc: i64,
    pub lac: i64,
    pub technology: String,
    pub signal: SignalMetrics,
    pub contributed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributed_at: Option<DateTime<Utc>>,
}

impl Observation {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.cell_id, self.mcc, self.mnc, self.lac)
    }
}
