//! FHIR bundle to domain model extraction.
//!
//! Walks `fhirBundle.entry` in document order and builds a [`Patient`] and a
//! list of [`Dose`] records. Each resource is handled independently: one that
//! does not have the expected shape is skipped and reported as a
//! [`PayloadError`], the rest of the bundle is still extracted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

use crate::credential::BundleEntry;
use crate::date::parse_calendar_date;
use crate::error::PayloadError;
use crate::registry::CodeLabels;

/// CVX code system URI.
pub const CVX_SYSTEM: &str = "http://hl7.org/fhir/sid/cvx";

/// SNOMED CT code system URI.
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";

/// The credential holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patient {
    /// Given names followed by the family name, space separated.
    pub name: String,
    /// Calendar date of birth.
    pub birth_date: Date,
}

/// Identity assurance level of an immunization record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityAssuranceLevel {
    Ial1_2,
    Ial1_4,
    Ial2,
    Ial3,
    /// A code outside the known levels, kept verbatim.
    Unrecognized(String),
}

impl IdentityAssuranceLevel {
    pub fn from_code(code: &str) -> Self {
        match code {
            "IAL1.2" => Self::Ial1_2,
            "IAL1.4" => Self::Ial1_4,
            "IAL2" => Self::Ial2,
            "IAL3" => Self::Ial3,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ial1_2 => "IAL1.2",
            Self::Ial1_4 => "IAL1.4",
            Self::Ial2 => "IAL2",
            Self::Ial3 => "IAL3",
            Self::Unrecognized(code) => code,
        }
    }
}

impl std::fmt::Display for IdentityAssuranceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for IdentityAssuranceLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// One administered vaccine dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dose {
    pub date: Date,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vaccine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mvx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snomed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_assurance: Option<IdentityAssuranceLevel>,
}

/// Everything extracted from one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub patient: Option<Patient>,
    /// Doses in bundle order (not yet sorted).
    pub doses: Vec<Dose>,
    pub skipped: Vec<PayloadError>,
}

// Wire shapes. Only the fields read below are declared; unknown fields are
// ignored.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientResource {
    #[serde(default)]
    name: Vec<HumanName>,
    birth_date: Option<String>,
}

#[derive(Deserialize)]
struct HumanName {
    family: Option<String>,
    #[serde(default)]
    given: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImmunizationResource {
    meta: Option<Meta>,
    vaccine_code: Option<CodeableConcept>,
    occurrence_date_time: Option<String>,
    manufacturer: Option<Reference>,
    lot_number: Option<String>,
    #[serde(default)]
    performer: Vec<Performer>,
}

#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    security: Vec<Coding>,
}

#[derive(Deserialize)]
struct CodeableConcept {
    #[serde(default)]
    coding: Vec<Coding>,
}

#[derive(Deserialize)]
struct Coding {
    system: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct Reference {
    identifier: Option<Identifier>,
}

#[derive(Deserialize)]
struct Identifier {
    value: Option<String>,
}

#[derive(Deserialize)]
struct Performer {
    actor: Option<PerformerActor>,
}

#[derive(Deserialize)]
struct PerformerActor {
    display: Option<String>,
}

/// Extracts the patient and doses from bundle entries.
///
/// The last `Patient` resource wins. Resource types other than `Patient` and
/// `Immunization` are ignored.
pub fn extract(entries: &[BundleEntry], labels: &CodeLabels) -> Extraction {
    let mut extraction = Extraction::default();

    for (index, entry) in entries.iter().enumerate() {
        let Some(resource) = &entry.resource else {
            continue;
        };

        let outcome = match entry.resource_type() {
            Some("Patient") => extract_patient(resource).map(|p| extraction.patient = Some(p)),
            Some("Immunization") => {
                extract_dose(resource, labels).map(|d| extraction.doses.push(d))
            }
            _ => Ok(()),
        };

        if let Err(message) = outcome {
            let resource_type = entry.resource_type().unwrap_or_default();
            tracing::warn!(index, resource_type, %message, "Skipping bundle resource");
            extraction
                .skipped
                .push(PayloadError::new(index, resource_type, message));
        }
    }

    tracing::debug!(
        patient = extraction.patient.is_some(),
        doses = extraction.doses.len(),
        skipped = extraction.skipped.len(),
        "Extracted bundle"
    );
    extraction
}

fn extract_patient(resource: &Value) -> Result<Patient, String> {
    let patient = PatientResource::deserialize(resource)
        .map_err(|e| format!("unexpected Patient shape: {e}"))?;

    let birth_date = patient
        .birth_date
        .as_deref()
        .ok_or_else(|| "missing birthDate".to_string())
        .and_then(parse_calendar_date)?;

    let name = patient
        .name
        .first()
        .map(|n| {
            n.given
                .iter()
                .map(String::as_str)
                .chain(n.family.as_deref())
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    Ok(Patient { name, birth_date })
}

fn extract_dose(resource: &Value, labels: &CodeLabels) -> Result<Dose, String> {
    let immunization = ImmunizationResource::deserialize(resource)
        .map_err(|e| format!("unexpected Immunization shape: {e}"))?;

    let date = immunization
        .occurrence_date_time
        .as_deref()
        .ok_or_else(|| "missing occurrenceDateTime".to_string())
        .and_then(parse_calendar_date)?;

    let coding = immunization
        .vaccine_code
        .map(|c| c.coding)
        .unwrap_or_default();
    let code_for = |system: &str| {
        coding
            .iter()
            .find(|c| c.system.as_deref() == Some(system))
            .and_then(|c| c.code.clone())
    };
    let cvx = code_for(CVX_SYSTEM);
    let snomed = code_for(SNOMED_SYSTEM);

    let mvx = immunization
        .manufacturer
        .and_then(|m| m.identifier)
        .and_then(|i| i.value);

    let performer = immunization
        .performer
        .into_iter()
        .next()
        .and_then(|p| p.actor)
        .and_then(|a| a.display);

    let identity_assurance = immunization
        .meta
        .and_then(|m| m.security.into_iter().next())
        .and_then(|c| c.code)
        .map(|code| IdentityAssuranceLevel::from_code(&code));

    Ok(Dose {
        date,
        performer,
        vaccine: cvx
            .as_deref()
            .and_then(|c| labels.vaccine_label(c))
            .map(str::to_string),
        manufacturer: mvx
            .as_deref()
            .and_then(|m| labels.manufacturer_label(m))
            .map(str::to_string),
        lot_number: immunization.lot_number,
        cvx,
        mvx,
        snomed,
        identity_assurance,
    })
}
