//! Domain types for the GearGuard maintenance service.
//!
//! Plain structs mirror the SQLite rows; the `*View` variants carry
//! foreign keys resolved to display shapes for list endpoints.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Users ───────────────────────────────────────────────────────────────

/// Access level attached to a user account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Technician,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Technician => "technician",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" => Ok(Role::Administrator),
            "technician" => Ok(Role::Technician),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account. The password hash never leaves the store
/// layer; responses carry [`PublicUser`] instead.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: String,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// The wire-safe projection of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

// ── Teams ───────────────────────────────────────────────────────────────

/// A maintenance team with raw member ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub members: Vec<i64>,
    pub created_at: String,
}

/// A maintenance team with members resolved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: i64,
    pub name: String,
    pub members: Vec<PublicUser>,
    pub created_at: String,
}

/// Minimal team shape embedded in other views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamRef {
    pub id: i64,
    pub name: String,
}

/// Minimal user shape embedded in other views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRef {
    pub id: i64,
    pub name: String,
}

// ── Equipment ───────────────────────────────────────────────────────────

/// A physical asset under maintenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: i64,
    pub name: String,
    pub serial_number: String,
    pub department: String,
    pub location: String,
    pub assigned_team: Option<i64>,
    pub scrapped: bool,
    pub created_at: String,
}

/// Equipment with the assigned team resolved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentView {
    pub id: i64,
    pub name: String,
    pub serial_number: String,
    pub department: String,
    pub location: String,
    pub assigned_team: Option<TeamRef>,
    pub scrapped: bool,
    pub created_at: String,
}

/// Minimal equipment shape embedded in request views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRef {
    pub id: i64,
    pub name: String,
    pub serial_number: String,
}

// ── Maintenance requests ────────────────────────────────────────────────

/// Whether a request reacts to a breakdown or schedules routine care.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Corrective,
    Preventive,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Corrective => "Corrective",
            RequestType::Preventive => "Preventive",
        }
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Corrective" => Ok(RequestType::Corrective),
            "Preventive" => Ok(RequestType::Preventive),
            _ => Err(format!("Invalid request type: {}", s)),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage of a maintenance request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestStatus {
    New,
    #[serde(rename = "In Progress")]
    InProgress,
    Repaired,
    Scrap,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::New => "New",
            RequestStatus::InProgress => "In Progress",
            RequestStatus::Repaired => "Repaired",
            RequestStatus::Scrap => "Scrap",
        }
    }

    /// Repaired and Scrap end the lifecycle; strict mode refuses to
    /// move a request out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Repaired | RequestStatus::Scrap)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(RequestStatus::New),
            "In Progress" => Ok(RequestStatus::InProgress),
            "Repaired" => Ok(RequestStatus::Repaired),
            "Scrap" => Ok(RequestStatus::Scrap),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A maintenance request as stored, with raw foreign keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRequest {
    pub id: i64,
    pub subject: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub equipment_id: i64,
    #[serde(rename = "team")]
    pub team_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub status: RequestStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub duration: Option<f64>,
    pub created_at: String,
}

/// A maintenance request with its references resolved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: i64,
    pub subject: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub equipment: EquipmentRef,
    pub team: Option<TeamRef>,
    pub assigned_to: Option<UserRef>,
    pub scheduled_date: Option<NaiveDate>,
    pub duration: Option<f64>,
    pub created_at: String,
}
