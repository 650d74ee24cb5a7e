use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use kinship_core::{AggregateRoot, Entity};
use kinship_family::{Child, Family, FamilyStatus, Parent};

use crate::app::services::{DivorceOutcome, PersonInput};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PersonRequest {
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub death_date: Option<NaiveDate>,
}

impl From<PersonRequest> for PersonInput {
    fn from(req: PersonRequest) -> Self {
        Self {
            id: req.id,
            first_name: req.first_name,
            last_name: req.last_name,
            birth_date: req.birth_date,
            death_date: req.death_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFamilyRequest {
    pub status: Option<FamilyStatus>,
    pub parents: Vec<PersonRequest>,
    #[serde(default)]
    pub children: Vec<PersonRequest>,
}

#[derive(Debug, Deserialize)]
pub struct MarkDeceasedRequest {
    pub death_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct DivorceRequest {
    pub custodial_parent_id: String,
}

// -------------------------
// Response mapping
// -------------------------

fn person_json(id: &str, first: &str, last: &str, birth: NaiveDate, death: Option<NaiveDate>) -> Value {
    json!({
        "id": id,
        "first_name": first,
        "last_name": last,
        "birth_date": birth,
        "death_date": death,
    })
}

pub fn parent_to_json(p: &Parent) -> Value {
    person_json(
        p.id().as_str(),
        p.first_name().as_str(),
        p.last_name().as_str(),
        p.birth_date().date(),
        p.death_date().map(|d| d.date()),
    )
}

pub fn child_to_json(c: &Child) -> Value {
    person_json(
        c.id().as_str(),
        c.first_name().as_str(),
        c.last_name().as_str(),
        c.birth_date().date(),
        c.death_date().map(|d| d.date()),
    )
}

pub fn family_to_json(f: &Family) -> Value {
    json!({
        "id": f.id().as_str(),
        "status": f.status().as_str(),
        "version": f.version(),
        "parents": f.parents().iter().map(parent_to_json).collect::<Vec<_>>(),
        "children": f.children().iter().map(child_to_json).collect::<Vec<_>>(),
    })
}

pub fn families_to_json(families: &[Family]) -> Value {
    json!({ "items": families.iter().map(family_to_json).collect::<Vec<_>>() })
}

pub fn divorce_to_json(outcome: &DivorceOutcome) -> Value {
    json!({
        "family": family_to_json(&outcome.family),
        "non_custodial_family": family_to_json(&outcome.non_custodial_family),
    })
}
