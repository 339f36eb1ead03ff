//! SQLite persistence for users, teams, equipment, and maintenance
//! requests.
//!
//! [`Store`] owns the connection and exposes synchronous operations
//! returning [`StoreError`]. [`DbHandle`] wraps a store in
//! `Arc<Mutex<_>>` and runs closures on a blocking thread so handlers
//! never hold the connection on the async executor.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::StoreError;
use crate::models::{
    Equipment, EquipmentRef, EquipmentView, MaintenanceRequest, PublicUser, RequestStatus,
    RequestType, RequestView, Role, Team, TeamRef, TeamView, User, UserRef,
};

const REQUEST_VIEW_SELECT: &str = "\
    SELECT r.id, r.subject, r.request_type, r.status, r.scheduled_date, r.duration, r.created_at,
           e.id, e.name, e.serial_number,
           t.id, t.name,
           u.id, u.name
    FROM requests r
    JOIN equipment e ON e.id = r.equipment_id
    LEFT JOIN teams t ON t.id = r.team_id
    LEFT JOIN users u ON u.id = r.assigned_to";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `db_path` and apply migrations.
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;
        self.run_migrations()
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'technician',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS teams (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS team_members (
                    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    UNIQUE(team_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS equipment (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    serial_number TEXT NOT NULL UNIQUE,
                    department TEXT NOT NULL,
                    location TEXT NOT NULL,
                    team_id INTEGER REFERENCES teams(id) ON DELETE SET NULL,
                    scrapped INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject TEXT NOT NULL,
                    request_type TEXT NOT NULL,
                    equipment_id INTEGER NOT NULL REFERENCES equipment(id) ON DELETE CASCADE,
                    team_id INTEGER REFERENCES teams(id) ON DELETE SET NULL,
                    assigned_to INTEGER REFERENCES users(id),
                    status TEXT NOT NULL DEFAULT 'New',
                    scheduled_date TEXT,
                    duration REAL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_team_members_team ON team_members(team_id);
                CREATE INDEX IF NOT EXISTS idx_equipment_team ON equipment(team_id);
                CREATE INDEX IF NOT EXISTS idx_requests_equipment ON requests(equipment_id);
                CREATE INDEX IF NOT EXISTS idx_requests_type ON requests(request_type);",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────────

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, StoreError> {
        if self.get_user_by_email(email)?.is_some() {
            return Err(StoreError::Conflict("User already exists".into()));
        }
        self.conn.execute(
            "INSERT INTO users (name, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
            params![name, email, password_hash, role.as_str()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?
            .ok_or_else(|| StoreError::Internal("User not found after insert".into()))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, email, password_hash, role, created_at
                 FROM users WHERE id = ?1",
                params![id],
                UserRow::from_row,
            )
            .optional()?;
        row.map(UserRow::into_user).transpose()
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, email, password_hash, role, created_at
                 FROM users WHERE email = ?1",
                params![email],
                UserRow::from_row,
            )
            .optional()?;
        row.map(UserRow::into_user).transpose()
    }

    fn user_exists(&self, id: i64) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ── Teams ───────────────────────────────────────────────────────

    pub fn create_team(&self, name: &str, member_ids: &[i64]) -> Result<Team, StoreError> {
        if self.team_name_taken(name, None)? {
            return Err(StoreError::Conflict("Maintenance team already exists".into()));
        }
        for &user_id in member_ids {
            if !self.user_exists(user_id)? {
                return Err(StoreError::NotFound("User not found".into()));
            }
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("INSERT INTO teams (name) VALUES (?1)", params![name])?;
        let team_id = tx.last_insert_rowid();
        for &user_id in member_ids {
            tx.execute(
                "INSERT OR IGNORE INTO team_members (team_id, user_id) VALUES (?1, ?2)",
                params![team_id, user_id],
            )?;
        }
        tx.commit()?;
        self.get_team(team_id)?
            .ok_or_else(|| StoreError::Internal("Team not found after insert".into()))
    }

    pub fn get_team(&self, id: i64) -> Result<Option<Team>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM teams WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, name, created_at)) = row else {
            return Ok(None);
        };
        let members = self.team_member_ids(id)?;
        Ok(Some(Team {
            id,
            name,
            members,
            created_at,
        }))
    }

    pub fn get_team_view(&self, id: i64) -> Result<Option<TeamView>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM teams WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, name, created_at)) = row else {
            return Ok(None);
        };
        let members = self.team_members_resolved(id)?;
        Ok(Some(TeamView {
            id,
            name,
            members,
            created_at,
        }))
    }

    pub fn list_teams(&self) -> Result<Vec<TeamView>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, created_at FROM teams ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let heads = rows.collect::<Result<Vec<_>, _>>()?;
        let mut teams = Vec::with_capacity(heads.len());
        for (id, name, created_at) in heads {
            let members = self.team_members_resolved(id)?;
            teams.push(TeamView {
                id,
                name,
                members,
                created_at,
            });
        }
        Ok(teams)
    }

    pub fn update_team(
        &self,
        id: i64,
        name: Option<&str>,
        member_ids: Option<&[i64]>,
    ) -> Result<Team, StoreError> {
        if !self.team_exists(id)? {
            return Err(StoreError::NotFound("Maintenance team not found".into()));
        }
        if let Some(name) = name {
            if self.team_name_taken(name, Some(id))? {
                return Err(StoreError::Conflict("Maintenance team already exists".into()));
            }
        }
        if let Some(ids) = member_ids {
            for &user_id in ids {
                if !self.user_exists(user_id)? {
                    return Err(StoreError::NotFound("User not found".into()));
                }
            }
        }
        let tx = self.conn.unchecked_transaction()?;
        if let Some(name) = name {
            tx.execute("UPDATE teams SET name = ?2 WHERE id = ?1", params![id, name])?;
        }
        if let Some(ids) = member_ids {
            tx.execute("DELETE FROM team_members WHERE team_id = ?1", params![id])?;
            for &user_id in ids {
                tx.execute(
                    "INSERT OR IGNORE INTO team_members (team_id, user_id) VALUES (?1, ?2)",
                    params![id, user_id],
                )?;
            }
        }
        tx.commit()?;
        self.get_team(id)?
            .ok_or_else(|| StoreError::Internal("Team not found after update".into()))
    }

    pub fn delete_team(&self, id: i64) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute("DELETE FROM teams WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    pub fn add_team_member(&self, team_id: i64, user_id: i64) -> Result<Team, StoreError> {
        if !self.team_exists(team_id)? {
            return Err(StoreError::NotFound("Maintenance team not found".into()));
        }
        if !self.user_exists(user_id)? {
            return Err(StoreError::NotFound("User not found".into()));
        }
        if self.is_team_member(team_id, user_id)? {
            return Err(StoreError::Conflict("User already part of this team".into()));
        }
        self.conn.execute(
            "INSERT INTO team_members (team_id, user_id) VALUES (?1, ?2)",
            params![team_id, user_id],
        )?;
        self.get_team(team_id)?
            .ok_or_else(|| StoreError::Internal("Team not found after update".into()))
    }

    /// Removing a user who is not a member is a no-op, not an error.
    pub fn remove_team_member(&self, team_id: i64, user_id: i64) -> Result<Team, StoreError> {
        if !self.team_exists(team_id)? {
            return Err(StoreError::NotFound("Maintenance team not found".into()));
        }
        self.conn.execute(
            "DELETE FROM team_members WHERE team_id = ?1 AND user_id = ?2",
            params![team_id, user_id],
        )?;
        self.get_team(team_id)?
            .ok_or_else(|| StoreError::Internal("Team not found after update".into()))
    }

    fn team_exists(&self, id: i64) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM teams WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn team_name_taken(&self, name: &str, exclude: Option<i64>) -> Result<bool, StoreError> {
        let count: i64 = match exclude {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM teams WHERE name = ?1 AND id != ?2",
                params![name, id],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM teams WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?,
        };
        Ok(count > 0)
    }

    fn is_team_member(&self, team_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM team_members WHERE team_id = ?1 AND user_id = ?2",
            params![team_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn team_member_ids(&self, team_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM team_members WHERE team_id = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![team_id], |row| row.get(0))?;
        let ids = rows.collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn team_members_resolved(&self, team_id: i64) -> Result<Vec<PublicUser>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, u.email, u.role
             FROM team_members tm
             JOIN users u ON u.id = tm.user_id
             WHERE tm.team_id = ?1
             ORDER BY tm.rowid",
        )?;
        let rows = stmt.query_map(params![team_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut members = Vec::new();
        for row in rows {
            let (id, name, email, role) = row?;
            members.push(PublicUser {
                id,
                name,
                email,
                role: Role::from_str(&role).map_err(StoreError::Internal)?,
            });
        }
        Ok(members)
    }

    // ── Equipment ───────────────────────────────────────────────────

    pub fn create_equipment(
        &self,
        name: &str,
        serial_number: &str,
        department: &str,
        location: &str,
        team_id: Option<i64>,
    ) -> Result<Equipment, StoreError> {
        if self.serial_taken(serial_number, None)? {
            return Err(StoreError::Conflict(
                "Equipment with this serial number already exists".into(),
            ));
        }
        if let Some(team_id) = team_id {
            if !self.team_exists(team_id)? {
                return Err(StoreError::NotFound("Maintenance team not found".into()));
            }
        }
        self.conn.execute(
            "INSERT INTO equipment (name, serial_number, department, location, team_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, serial_number, department, location, team_id],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_equipment(id)?
            .ok_or_else(|| StoreError::Internal("Equipment not found after insert".into()))
    }

    pub fn get_equipment(&self, id: i64) -> Result<Option<Equipment>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, serial_number, department, location, team_id, scrapped, created_at
                 FROM equipment WHERE id = ?1",
                params![id],
                EquipmentRow::from_row,
            )
            .optional()?;
        Ok(row.map(EquipmentRow::into_equipment))
    }

    pub fn get_equipment_view(&self, id: i64) -> Result<Option<EquipmentView>, StoreError> {
        let view = self
            .conn
            .query_row(
                "SELECT e.id, e.name, e.serial_number, e.department, e.location, e.scrapped,
                        e.created_at, t.id, t.name
                 FROM equipment e
                 LEFT JOIN teams t ON t.id = e.team_id
                 WHERE e.id = ?1",
                params![id],
                equipment_view_from_row,
            )
            .optional()?;
        Ok(view)
    }

    pub fn list_equipment(&self) -> Result<Vec<EquipmentView>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.name, e.serial_number, e.department, e.location, e.scrapped,
                    e.created_at, t.id, t.name
             FROM equipment e
             LEFT JOIN teams t ON t.id = e.team_id
             ORDER BY e.created_at DESC, e.id DESC",
        )?;
        let rows = stmt.query_map([], equipment_view_from_row)?;
        let views = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(views)
    }

    /// A `team_id` of `None` leaves the assignment untouched.
    /// `Some(None)` clears it and `Some(Some(id))` reassigns.
    pub fn update_equipment(
        &self,
        id: i64,
        name: Option<&str>,
        serial_number: Option<&str>,
        department: Option<&str>,
        location: Option<&str>,
        team_id: Option<Option<i64>>,
    ) -> Result<Equipment, StoreError> {
        if self.get_equipment(id)?.is_none() {
            return Err(StoreError::NotFound("Equipment not found".into()));
        }
        if let Some(serial) = serial_number {
            if self.serial_taken(serial, Some(id))? {
                return Err(StoreError::Conflict(
                    "Equipment with this serial number already exists".into(),
                ));
            }
        }
        if let Some(Some(team_id)) = team_id {
            if !self.team_exists(team_id)? {
                return Err(StoreError::NotFound("Maintenance team not found".into()));
            }
        }
        let tx = self.conn.unchecked_transaction()?;
        if let Some(name) = name {
            tx.execute(
                "UPDATE equipment SET name = ?2 WHERE id = ?1",
                params![id, name],
            )?;
        }
        if let Some(serial) = serial_number {
            tx.execute(
                "UPDATE equipment SET serial_number = ?2 WHERE id = ?1",
                params![id, serial],
            )?;
        }
        if let Some(department) = department {
            tx.execute(
                "UPDATE equipment SET department = ?2 WHERE id = ?1",
                params![id, department],
            )?;
        }
        if let Some(location) = location {
            tx.execute(
                "UPDATE equipment SET location = ?2 WHERE id = ?1",
                params![id, location],
            )?;
        }
        if let Some(team_id) = team_id {
            tx.execute(
                "UPDATE equipment SET team_id = ?2 WHERE id = ?1",
                params![id, team_id],
            )?;
        }
        tx.commit()?;
        self.get_equipment(id)?
            .ok_or_else(|| StoreError::Internal("Equipment not found after update".into()))
    }

    pub fn delete_equipment(&self, id: i64) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute("DELETE FROM equipment WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Flag the equipment as scrapped and force every one of its
    /// requests to Scrap, in a single transaction. Re-scrapping is a
    /// no-op. Returns how many requests were touched.
    pub fn scrap_equipment(&self, id: i64) -> Result<usize, StoreError> {
        if self.get_equipment(id)?.is_none() {
            return Err(StoreError::NotFound("Equipment not found".into()));
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("UPDATE equipment SET scrapped = 1 WHERE id = ?1", params![id])?;
        let cascaded = tx.execute(
            "UPDATE requests SET status = ?2 WHERE equipment_id = ?1",
            params![id, RequestStatus::Scrap.as_str()],
        )?;
        tx.commit()?;
        Ok(cascaded)
    }

    /// Requests still in New or In Progress for one piece of equipment.
    pub fn open_request_count(&self, equipment_id: i64) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE equipment_id = ?1 AND status IN (?2, ?3)",
            params![
                equipment_id,
                RequestStatus::New.as_str(),
                RequestStatus::InProgress.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn serial_taken(&self, serial_number: &str, exclude: Option<i64>) -> Result<bool, StoreError> {
        let count: i64 = match exclude {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM equipment WHERE serial_number = ?1 AND id != ?2",
                params![serial_number, id],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM equipment WHERE serial_number = ?1",
                params![serial_number],
                |row| row.get(0),
            )?,
        };
        Ok(count > 0)
    }

    // ── Maintenance requests ────────────────────────────────────────

    pub fn create_request(
        &self,
        subject: &str,
        request_type: RequestType,
        equipment_id: i64,
        scheduled_date: Option<NaiveDate>,
    ) -> Result<MaintenanceRequest, StoreError> {
        let equipment = self
            .get_equipment(equipment_id)?
            .ok_or_else(|| StoreError::NotFound("Equipment not found".into()))?;
        // The team is captured from the equipment once, at creation
        // time, and never re-derived afterwards.
        let team_id = equipment.assigned_team;
        let scheduled_date = match request_type {
            RequestType::Preventive => scheduled_date,
            RequestType::Corrective => None,
        };
        self.conn.execute(
            "INSERT INTO requests (subject, request_type, equipment_id, team_id, status, scheduled_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                subject,
                request_type.as_str(),
                equipment_id,
                team_id,
                RequestStatus::New.as_str(),
                scheduled_date.map(|d| d.to_string()),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_request(id)?
            .ok_or_else(|| StoreError::Internal("Request not found after insert".into()))
    }

    pub fn get_request(&self, id: i64) -> Result<Option<MaintenanceRequest>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, subject, request_type, equipment_id, team_id, assigned_to, status,
                        scheduled_date, duration, created_at
                 FROM requests WHERE id = ?1",
                params![id],
                RequestRow::from_row,
            )
            .optional()?;
        row.map(RequestRow::into_request).transpose()
    }

    pub fn get_request_view(&self, id: i64) -> Result<Option<RequestView>, StoreError> {
        let sql = format!("{REQUEST_VIEW_SELECT} WHERE r.id = ?1");
        let mut views = self.collect_request_views(&sql, params![id])?;
        Ok(views.pop())
    }

    pub fn list_requests(&self) -> Result<Vec<RequestView>, StoreError> {
        let sql = format!("{REQUEST_VIEW_SELECT} ORDER BY r.created_at DESC, r.id DESC");
        self.collect_request_views(&sql, [])
    }

    pub fn list_preventive_requests(&self) -> Result<Vec<RequestView>, StoreError> {
        let sql = format!(
            "{REQUEST_VIEW_SELECT} WHERE r.request_type = ?1 ORDER BY r.created_at DESC, r.id DESC"
        );
        self.collect_request_views(&sql, params![RequestType::Preventive.as_str()])
    }

    pub fn list_requests_for_equipment(
        &self,
        equipment_id: i64,
    ) -> Result<Vec<RequestView>, StoreError> {
        let sql = format!(
            "{REQUEST_VIEW_SELECT} WHERE r.equipment_id = ?1 ORDER BY r.created_at DESC, r.id DESC"
        );
        self.collect_request_views(&sql, params![equipment_id])
    }

    /// Set the assignee and force the request into In Progress. With
    /// `strict` on, requests already Repaired or Scrap are refused.
    pub fn assign_technician(
        &self,
        id: i64,
        technician_id: i64,
        strict: bool,
    ) -> Result<MaintenanceRequest, StoreError> {
        let request = self
            .get_request(id)?
            .ok_or_else(|| StoreError::NotFound("Maintenance request not found".into()))?;
        if !self.user_exists(technician_id)? {
            return Err(StoreError::NotFound("User not found".into()));
        }
        if strict && request.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "Request is already {} and cannot be reassigned",
                request.status
            )));
        }
        self.conn.execute(
            "UPDATE requests SET assigned_to = ?2, status = ?3 WHERE id = ?1",
            params![id, technician_id, RequestStatus::InProgress.as_str()],
        )?;
        self.get_request(id)?
            .ok_or_else(|| StoreError::Internal("Request not found after update".into()))
    }

    /// Move the request to `status`. Repaired records a duration
    /// (defaulting to zero); other statuses leave it untouched. With
    /// `strict` on, leaving a terminal status is refused.
    pub fn update_request_status(
        &self,
        id: i64,
        status: RequestStatus,
        duration: Option<f64>,
        strict: bool,
    ) -> Result<MaintenanceRequest, StoreError> {
        let request = self
            .get_request(id)?
            .ok_or_else(|| StoreError::NotFound("Maintenance request not found".into()))?;
        if strict && request.status.is_terminal() && status != request.status {
            return Err(StoreError::Conflict(format!(
                "Request is already {} and cannot move to {}",
                request.status, status
            )));
        }
        if status == RequestStatus::Repaired {
            self.conn.execute(
                "UPDATE requests SET status = ?2, duration = ?3 WHERE id = ?1",
                params![id, status.as_str(), duration.unwrap_or(0.0)],
            )?;
        } else {
            self.conn.execute(
                "UPDATE requests SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )?;
        }
        self.get_request(id)?
            .ok_or_else(|| StoreError::Internal("Request not found after update".into()))
    }

    pub fn delete_request(&self, id: i64) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute("DELETE FROM requests WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    fn collect_request_views(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<RequestView>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, RequestViewRow::from_row)?;
        let mut views = Vec::new();
        for row in rows {
            views.push(row?.into_view()?);
        }
        Ok(views)
    }
}

// ── Row helpers ─────────────────────────────────────────────────────────

struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role: Role::from_str(&self.role).map_err(StoreError::Internal)?,
            created_at: self.created_at,
        })
    }
}

struct EquipmentRow {
    id: i64,
    name: String,
    serial_number: String,
    department: String,
    location: String,
    team_id: Option<i64>,
    scrapped: bool,
    created_at: String,
}

impl EquipmentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            serial_number: row.get(2)?,
            department: row.get(3)?,
            location: row.get(4)?,
            team_id: row.get(5)?,
            scrapped: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_equipment(self) -> Equipment {
        Equipment {
            id: self.id,
            name: self.name,
            serial_number: self.serial_number,
            department: self.department,
            location: self.location,
            assigned_team: self.team_id,
            scrapped: self.scrapped,
            created_at: self.created_at,
        }
    }
}

fn equipment_view_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EquipmentView> {
    let team_id: Option<i64> = row.get(7)?;
    let assigned_team = match team_id {
        Some(id) => Some(TeamRef {
            id,
            name: row.get(8)?,
        }),
        None => None,
    };
    Ok(EquipmentView {
        id: row.get(0)?,
        name: row.get(1)?,
        serial_number: row.get(2)?,
        department: row.get(3)?,
        location: row.get(4)?,
        scrapped: row.get(5)?,
        created_at: row.get(6)?,
        assigned_team,
    })
}

struct RequestRow {
    id: i64,
    subject: String,
    request_type: String,
    equipment_id: i64,
    team_id: Option<i64>,
    assigned_to: Option<i64>,
    status: String,
    scheduled_date: Option<String>,
    duration: Option<f64>,
    created_at: String,
}

impl RequestRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            request_type: row.get(2)?,
            equipment_id: row.get(3)?,
            team_id: row.get(4)?,
            assigned_to: row.get(5)?,
            status: row.get(6)?,
            scheduled_date: row.get(7)?,
            duration: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_request(self) -> Result<MaintenanceRequest, StoreError> {
        let scheduled_date = match self.scheduled_date {
            Some(raw) => Some(raw.parse::<NaiveDate>().map_err(|_| {
                StoreError::Internal(format!("Invalid scheduled date in database: {}", raw))
            })?),
            None => None,
        };
        Ok(MaintenanceRequest {
            id: self.id,
            subject: self.subject,
            request_type: RequestType::from_str(&self.request_type).map_err(StoreError::Internal)?,
            equipment_id: self.equipment_id,
            team_id: self.team_id,
            assigned_to: self.assigned_to,
            status: RequestStatus::from_str(&self.status).map_err(StoreError::Internal)?,
            scheduled_date,
            duration: self.duration,
            created_at: self.created_at,
        })
    }
}

struct RequestViewRow {
    id: i64,
    subject: String,
    request_type: String,
    status: String,
    scheduled_date: Option<String>,
    duration: Option<f64>,
    created_at: String,
    equipment_id: i64,
    equipment_name: String,
    serial_number: String,
    team_id: Option<i64>,
    team_name: Option<String>,
    assignee_id: Option<i64>,
    assignee_name: Option<String>,
}

impl RequestViewRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            request_type: row.get(2)?,
            status: row.get(3)?,
            scheduled_date: row.get(4)?,
            duration: row.get(5)?,
            created_at: row.get(6)?,
            equipment_id: row.get(7)?,
            equipment_name: row.get(8)?,
            serial_number: row.get(9)?,
            team_id: row.get(10)?,
            team_name: row.get(11)?,
            assignee_id: row.get(12)?,
            assignee_name: row.get(13)?,
        })
    }

    fn into_view(self) -> Result<RequestView, StoreError> {
        let scheduled_date = match self.scheduled_date {
            Some(raw) => Some(raw.parse::<NaiveDate>().map_err(|_| {
                StoreError::Internal(format!("Invalid scheduled date in database: {}", raw))
            })?),
            None => None,
        };
        Ok(RequestView {
            id: self.id,
            subject: self.subject,
            request_type: RequestType::from_str(&self.request_type).map_err(StoreError::Internal)?,
            status: RequestStatus::from_str(&self.status).map_err(StoreError::Internal)?,
            equipment: EquipmentRef {
                id: self.equipment_id,
                name: self.equipment_name,
                serial_number: self.serial_number,
            },
            team: self
                .team_id
                .zip(self.team_name)
                .map(|(id, name)| TeamRef { id, name }),
            assigned_to: self
                .assignee_id
                .zip(self.assignee_name)
                .map(|(id, name)| UserRef { id, name }),
            scheduled_date,
            duration: self.duration,
            created_at: self.created_at,
        })
    }
}

// ── Async handle ────────────────────────────────────────────────────────

/// Cloneable handle that serializes store access through a blocking
/// thread, keeping rusqlite work off the async executor.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<Mutex<Store>>,
}

impl DbHandle {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` against the store on a blocking thread. Everything the
    /// closure captures must be owned.
    pub async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Store) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        let result = tokio::task::spawn_blocking(move || {
            let store = inner
                .lock()
                .map_err(|e| StoreError::Internal(format!("Store lock poisoned: {}", e)))?;
            f(&store)
        })
        .await;
        match result {
            Ok(output) => output,
            Err(e) => Err(StoreError::Internal(format!("Store task panicked: {}", e))),
        }
    }
}
