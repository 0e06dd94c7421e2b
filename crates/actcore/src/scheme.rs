use crate::{
    Activity, ActivityError, ActivityHandler, ActivityKind, ActivityParameter, EventHolder,
    HandlingMode, NextActivityKey, Priority, SchemeError, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the auto-generated terminal return activity every scheme carries.
pub const EXIT_ACTIVITY: &str = "Exit";

/// The compiled, immutable workflow graph.
///
/// Shared read-only between all running instances; all per-run mutable state
/// lives in the execution context.
pub struct WorkflowScheme {
    pub name: String,
    pub root_activity: String,
    pub default_result: NextActivityKey,
    pub exit_activity: String,
    activities: HashMap<String, Arc<Activity>>,
}

impl WorkflowScheme {
    pub fn builder(name: impl Into<String>, default_result: impl Into<NextActivityKey>) -> SchemeBuilder {
        SchemeBuilder::new(name, default_result)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Activity>> {
        self.activities.get(name)
    }

    pub fn require(&self, name: &str) -> Result<Arc<Activity>, ActivityError> {
        self.activities
            .get(name)
            .cloned()
            .ok_or_else(|| ActivityError::UnknownActivity(name.to_string()))
    }

    pub fn root(&self) -> Arc<Activity> {
        self.activities[&self.root_activity].clone()
    }

    pub fn exit(&self) -> Arc<Activity> {
        self.activities[&self.exit_activity].clone()
    }

    pub fn activities(&self) -> impl Iterator<Item = &Arc<Activity>> {
        self.activities.values()
    }

    /// Parent of a named activity, if it has one.
    pub fn parent_of(&self, activity: &Activity) -> Option<&Arc<Activity>> {
        activity.parent.as_deref().and_then(|p| self.activities.get(p))
    }
}

impl std::fmt::Debug for WorkflowScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowScheme")
            .field("name", &self.name)
            .field("root_activity", &self.root_activity)
            .field("default_result", &self.default_result)
            .field("activities", &self.activities.len())
            .finish()
    }
}

/// One activity under construction.
pub struct ActivityDecl {
    name: String,
    kind: ActivityKind,
    priority: Priority,
    tracking: bool,
    handler: Option<Arc<dyn ActivityHandler>>,
    transitions: Vec<(NextActivityKey, String)>,
    parameters: Vec<ActivityParameter>,
    properties: HashMap<String, Value>,
}

impl ActivityDecl {
    fn new(name: String, kind: ActivityKind) -> Self {
        Self {
            name,
            kind,
            priority: Priority::NORMAL,
            tracking: true,
            handler: None,
            transitions: Vec::new(),
            parameters: Vec::new(),
            properties: HashMap::new(),
        }
    }

    pub fn priority(&mut self, priority: Priority) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Exclude this activity (and, while it executes, its descendants) from
    /// the durable checkpoint log.
    pub fn no_tracking(&mut self) -> &mut Self {
        self.tracking = false;
        self
    }

    pub fn handler(&mut self, handler: Arc<dyn ActivityHandler>) -> &mut Self {
        self.handler = Some(handler);
        self
    }

    pub fn transition(
        &mut self,
        key: impl Into<NextActivityKey>,
        target: impl Into<String>,
    ) -> &mut Self {
        self.transitions.push((key.into(), target.into()));
        self
    }

    pub fn parameter(&mut self, parameter: ActivityParameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn property(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn mode(&mut self, mode: HandlingMode) -> &mut Self {
        if let ActivityKind::SubscribeToEvent { mode: m, .. } = &mut self.kind {
            *m = mode;
        }
        self
    }
}

/// Programmatic scheme construction.
///
/// The textual scheme compiler is an external collaborator; the engine only
/// consumes the finished graph, and this builder is how hosts and tests
/// produce one. Declaration order of children fixes both the composite entry
/// point and the `following` sibling pointers.
pub struct SchemeBuilder {
    name: String,
    default_result: NextActivityKey,
    decls: Vec<ActivityDecl>,
}

impl SchemeBuilder {
    pub fn new(name: impl Into<String>, default_result: impl Into<NextActivityKey>) -> Self {
        Self {
            name: name.into(),
            default_result: default_result.into(),
            decls: Vec::new(),
        }
    }

    fn push(&mut self, name: impl Into<String>, kind: ActivityKind) -> &mut ActivityDecl {
        self.decls.push(ActivityDecl::new(name.into(), kind));
        self.decls.last_mut().unwrap()
    }

    pub fn activity(&mut self, name: impl Into<String>) -> &mut ActivityDecl {
        self.push(name, ActivityKind::Task)
    }

    pub fn composite(&mut self, name: impl Into<String>) -> &mut ActivityDecl {
        self.push(name, ActivityKind::Composite { children: Vec::new() })
    }

    pub fn reference(
        &mut self,
        name: impl Into<String>,
        target: impl Into<String>,
    ) -> &mut ActivityDecl {
        self.push(name, ActivityKind::Reference { target: target.into() })
    }

    pub fn return_activity(
        &mut self,
        name: impl Into<String>,
        result: impl Into<NextActivityKey>,
    ) -> &mut ActivityDecl {
        self.push(name, ActivityKind::Return { result: result.into() })
    }

    pub fn subscribe(
        &mut self,
        name: impl Into<String>,
        event: impl Into<String>,
        handler: impl Into<String>,
    ) -> &mut ActivityDecl {
        let name = name.into();
        let holder = EventHolder { event: event.into(), owner: name.clone() };
        self.push(
            name,
            ActivityKind::SubscribeToEvent {
                event: holder,
                handler: handler.into(),
                mode: HandlingMode::Sync,
            },
        )
    }

    pub fn unsubscribe(
        &mut self,
        name: impl Into<String>,
        event: impl Into<String>,
        handler: impl Into<String>,
    ) -> &mut ActivityDecl {
        let name = name.into();
        let holder = EventHolder { event: event.into(), owner: name.clone() };
        self.push(
            name,
            ActivityKind::UnsubscribeFromEvent { event: holder, handler: handler.into() },
        )
    }

    pub fn monitor_enter(
        &mut self,
        name: impl Into<String>,
        lock: impl Into<String>,
    ) -> &mut ActivityDecl {
        self.push(name, ActivityKind::MonitorEnter { lock: lock.into() })
    }

    pub fn monitor_exit(
        &mut self,
        name: impl Into<String>,
        lock: impl Into<String>,
    ) -> &mut ActivityDecl {
        self.push(name, ActivityKind::MonitorExit { lock: lock.into() })
    }

    pub fn build(mut self) -> Result<Arc<WorkflowScheme>, SchemeError> {
        let root = self
            .decls
            .iter()
            .find(|d| !d.name.contains('.'))
            .map(|d| d.name.clone())
            .ok_or(SchemeError::MissingRoot)?;

        // The terminal return node every scheme gets; Stop() redirects here.
        let mut exit = ActivityDecl::new(
            EXIT_ACTIVITY.to_string(),
            ActivityKind::Return { result: self.default_result.clone() },
        );
        exit.tracking = false;
        self.decls.push(exit);

        let mut names: Vec<String> = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            if decl.name.is_empty() || decl.name.split('.').any(str::is_empty) {
                return Err(SchemeError::InvalidName(decl.name.clone()));
            }
            if names.contains(&decl.name) {
                return Err(SchemeError::DuplicateActivity(decl.name.clone()));
            }
            names.push(decl.name.clone());
        }

        // Ordered children per parent, from declaration order.
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for decl in &self.decls {
            if let Some(parent) = parent_name(&decl.name) {
                if !names.iter().any(|n| n == parent) {
                    return Err(SchemeError::MissingParent {
                        parent: parent.to_string(),
                        child: decl.name.clone(),
                    });
                }
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(decl.name.clone());
            }
        }

        let check = |target: &str| -> Result<(), SchemeError> {
            if names.iter().any(|n| n == target) {
                Ok(())
            } else {
                Err(SchemeError::UnknownActivity(target.to_string()))
            }
        };

        let mut activities = HashMap::with_capacity(self.decls.len());
        for decl in self.decls {
            for (_, target) in &decl.transitions {
                check(target)?;
            }
            match &decl.kind {
                ActivityKind::Reference { target } => check(target)?,
                ActivityKind::SubscribeToEvent { handler, .. }
                | ActivityKind::UnsubscribeFromEvent { handler, .. } => check(handler)?,
                _ => {}
            }

            let parent = parent_name(&decl.name).map(str::to_string);
            let following = parent.as_ref().and_then(|p| {
                let siblings = &children[p];
                let idx = siblings.iter().position(|s| s == &decl.name)?;
                siblings.get(idx + 1).cloned()
            });
            let kind = match decl.kind {
                ActivityKind::Composite { .. } => ActivityKind::Composite {
                    children: children.get(&decl.name).cloned().unwrap_or_default(),
                },
                other => other,
            };

            let activity = Activity {
                name: decl.name.clone(),
                priority: decl.priority,
                tracking: decl.tracking,
                parent,
                transitions: decl.transitions.into_iter().collect(),
                following,
                parameters: decl.parameters,
                properties: decl.properties,
                kind,
                handler: decl.handler,
            };
            activities.insert(decl.name, Arc::new(activity));
        }

        Ok(Arc::new(WorkflowScheme {
            name: self.name,
            root_activity: root,
            default_result: self.default_result,
            exit_activity: EXIT_ACTIVITY.to_string(),
            activities,
        }))
    }
}

fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(parent, _)| parent)
}
