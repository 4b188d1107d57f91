//! Dashboard aggregate: a named grid of metric widgets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

use crate::metrics::Metric;

typed_id!(
    /// Dashboard identifier.
    DashboardId
);

pub const GRID_COLUMNS: u32 = 12;
pub const MAX_WIDGETS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Kpi,
    Table,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardStatus {
    Active,
    Archived,
}

/// Placement on a 12-column grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Position {
    fn validate(&self) -> Result<(), DomainError> {
        if self.w == 0 || self.h == 0 {
            return Err(DomainError::validation("widget width and height must be at least 1"));
        }
        if self.x.saturating_add(self.w) > GRID_COLUMNS {
            return Err(DomainError::validation(format!(
                "widget must fit within {GRID_COLUMNS} columns"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub widget_no: u32,
    pub title: String,
    pub kind: WidgetKind,
    pub metric: Metric,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    id: DashboardId,
    tenant_id: Option<TenantId>,
    name: String,
    description: Option<String>,
    owner: Option<UserId>,
    widgets: Vec<Widget>,
    next_widget_no: u32,
    status: DashboardStatus,
    version: u64,
    created: bool,
}

impl Dashboard {
    pub fn empty(id: DashboardId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            description: None,
            owner: None,
            widgets: Vec::new(),
            next_widget_no: 1,
            status: DashboardStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn status(&self) -> DashboardStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDashboard {
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub owner: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameDashboard {
    pub tenant_id: TenantId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddWidget {
    pub tenant_id: TenantId,
    pub title: String,
    pub kind: WidgetKind,
    pub metric: Metric,
    pub position: Position,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveWidget {
    pub tenant_id: TenantId,
    pub widget_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDashboard {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DashboardCommand {
    Create(CreateDashboard),
    Rename(RenameDashboard),
    AddWidget(AddWidget),
    RemoveWidget(RemoveWidget),
    Archive(ArchiveDashboard),
}

ironbooks_events::tenant_command!(DashboardCommand {
    Create,
    Rename,
    AddWidget,
    RemoveWidget,
    Archive,
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCreated {
    pub tenant_id: TenantId,
    pub dashboard_id: DashboardId,
    pub name: String,
    pub description: Option<String>,
    pub owner: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRenamed {
    pub tenant_id: TenantId,
    pub dashboard_id: DashboardId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetAdded {
    pub tenant_id: TenantId,
    pub dashboard_id: DashboardId,
    pub widget: Widget,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetRemoved {
    pub tenant_id: TenantId,
    pub dashboard_id: DashboardId,
    pub widget_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardArchived {
    pub tenant_id: TenantId,
    pub dashboard_id: DashboardId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DashboardEvent {
    Created(DashboardCreated),
    Renamed(DashboardRenamed),
    WidgetAdded(WidgetAdded),
    WidgetRemoved(WidgetRemoved),
    Archived(DashboardArchived),
}

impl Event for DashboardEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DashboardEvent::Created(_) => "reporting.dashboard.created",
            DashboardEvent::Renamed(_) => "reporting.dashboard.renamed",
            DashboardEvent::WidgetAdded(_) => "reporting.dashboard.widget_added",
            DashboardEvent::WidgetRemoved(_) => "reporting.dashboard.widget_removed",
            DashboardEvent::Archived(_) => "reporting.dashboard.archived",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DashboardEvent::Created(e) => e.occurred_at,
            DashboardEvent::Renamed(e) => e.occurred_at,
            DashboardEvent::WidgetAdded(e) => e.occurred_at,
            DashboardEvent::WidgetRemoved(e) => e.occurred_at,
            DashboardEvent::Archived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Dashboard {
    type Command = DashboardCommand;
    type Event = DashboardEvent;

    const AGGREGATE_TYPE: &'static str = "reporting.dashboard";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DashboardEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.owner = Some(e.owner);
                self.status = DashboardStatus::Active;
                self.created = true;
            }
            DashboardEvent::Renamed(e) => self.name = e.name.clone(),
            DashboardEvent::WidgetAdded(e) => {
                self.next_widget_no = e.widget.widget_no + 1;
                self.widgets.push(e.widget.clone());
            }
            DashboardEvent::WidgetRemoved(e) => {
                self.widgets.retain(|w| w.widget_no != e.widget_no);
            }
            DashboardEvent::Archived(_) => self.status = DashboardStatus::Archived,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            DashboardCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("dashboard already exists"));
                }
                Ok(vec![DashboardEvent::Created(DashboardCreated {
                    tenant_id: cmd.tenant_id,
                    dashboard_id: self.id,
                    name: text::required_max("name", &cmd.name, 120)?,
                    description: text::optional(cmd.description.as_deref()),
                    owner: cmd.owner,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DashboardCommand::Rename(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                let name = text::required_max("name", &cmd.name, 120)?;
                if name == self.name {
                    return Ok(vec![]);
                }
                Ok(vec![DashboardEvent::Renamed(DashboardRenamed {
                    tenant_id: cmd.tenant_id,
                    dashboard_id: self.id,
                    name,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DashboardCommand::AddWidget(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                if self.widgets.len() >= MAX_WIDGETS {
                    return Err(DomainError::invariant(format!(
                        "a dashboard holds at most {MAX_WIDGETS} widgets"
                    )));
                }
                cmd.position.validate()?;
                Ok(vec![DashboardEvent::WidgetAdded(WidgetAdded {
                    tenant_id: cmd.tenant_id,
                    dashboard_id: self.id,
                    widget: Widget {
                        widget_no: self.next_widget_no,
                        title: text::required_max("title", &cmd.title, 120)?,
                        kind: cmd.kind,
                        metric: cmd.metric,
                        position: cmd.position,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            DashboardCommand::RemoveWidget(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                if !self.widgets.iter().any(|w| w.widget_no == cmd.widget_no) {
                    return Err(DomainError::not_found());
                }
                Ok(vec![DashboardEvent::WidgetRemoved(WidgetRemoved {
                    tenant_id: cmd.tenant_id,
                    dashboard_id: self.id,
                    widget_no: cmd.widget_no,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DashboardCommand::Archive(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                Ok(vec![DashboardEvent::Archived(DashboardArchived {
                    tenant_id: cmd.tenant_id,
                    dashboard_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Dashboard {
    fn ensure_active(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.status == DashboardStatus::Archived {
            return Err(DomainError::invariant("dashboard is archived"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(d: &mut Dashboard, cmd: DashboardCommand) -> Result<(), DomainError> {
        for e in d.handle(&cmd)? {
            d.apply(&e);
        }
        Ok(())
    }

    fn created(tenant_id: TenantId) -> Dashboard {
        let mut d = Dashboard::empty(DashboardId::generate());
        run(
            &mut d,
            DashboardCommand::Create(CreateDashboard {
                tenant_id,
                name: "AP overview".to_string(),
                description: None,
                owner: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        d
    }

    fn add(tenant_id: TenantId, x: u32, w: u32) -> DashboardCommand {
        DashboardCommand::AddWidget(AddWidget {
            tenant_id,
            title: "Outstanding".to_string(),
            kind: WidgetKind::Kpi,
            metric: Metric::ApOutstanding,
            position: Position { x, y: 0, w, h: 2 },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn widget_numbers_are_not_reused() {
        let tenant_id = TenantId::new();
        let mut d = created(tenant_id);
        run(&mut d, add(tenant_id, 0, 6)).unwrap();
        run(&mut d, add(tenant_id, 6, 6)).unwrap();
        run(
            &mut d,
            DashboardCommand::RemoveWidget(RemoveWidget {
                tenant_id,
                widget_no: 2,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        run(&mut d, add(tenant_id, 6, 6)).unwrap();

        let numbers: Vec<u32> = d.widgets().iter().map(|w| w.widget_no).collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn widget_must_fit_grid() {
        let tenant_id = TenantId::new();
        let d = created(tenant_id);
        assert!(matches!(
            d.handle(&add(tenant_id, 8, 6)).unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(d.handle(&add(tenant_id, 0, 0)).is_err());
    }

    #[test]
    fn widget_limit_is_enforced() {
        let tenant_id = TenantId::new();
        let mut d = created(tenant_id);
        for _ in 0..MAX_WIDGETS {
            run(&mut d, add(tenant_id, 0, 1)).unwrap();
        }
        assert!(matches!(
            d.handle(&add(tenant_id, 0, 1)).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
    }

    #[test]
    fn archived_dashboard_rejects_changes() {
        let tenant_id = TenantId::new();
        let mut d = created(tenant_id);
        run(
            &mut d,
            DashboardCommand::Archive(ArchiveDashboard {
                tenant_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(d.handle(&add(tenant_id, 0, 4)).is_err());
    }
}
