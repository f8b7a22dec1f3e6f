//! # Planner
//!
//! The planner is the single write path. Each public mutation:
//! 1. loads the caller's rows through the owner-scoped `Store`
//! 2. validates input, references and the hierarchy
//! 3. applies the change plus its derived effects (propagation, cascades,
//!    category nulling, profile stats) to a working copy
//! 4. commits everything as one `Changeset`
//!
//! A failed step returns before the commit, so a mutation either lands whole
//! or not at all.

use crate::dashboard::{
    self, Dashboard, GoalStatistics, OverdueItem, ProductivityMetrics, TodayItem,
};
use crate::export::{ImportReport, Snapshot};
use crate::primitives::{MAX_DESCRIPTION_LENGTH, MAX_TAG_LENGTH, MAX_TAGS, MAX_TITLE_LENGTH};
use crate::storage::{Backend, Changeset, Store, Write};
use crate::{
    Category, CategoryId, CategoryPatch, Event, EventId, EventPatch, Goal, GoalId, GoalPatch,
    GoalStatus, Level, NewCategory, NewEvent, NewGoal, OwnerId, Preferences, Profile,
    ProfilePatch, RowKind, WaypointError, hierarchy, progress, stats, validate_color,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// FILTERS & VIEWS
// =============================================================================

/// Criteria for listing goals. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalFilter {
    pub level: Option<Level>,
    pub status: Option<GoalStatus>,
    pub parent: Option<GoalId>,
    pub category: Option<CategoryId>,
    pub root_only: bool,
}

impl GoalFilter {
    #[must_use]
    pub fn matches(&self, goal: &Goal) -> bool {
        self.level.is_none_or(|l| goal.level == l)
            && self.status.is_none_or(|s| goal.status == s)
            && self.parent.is_none_or(|p| goal.parent == Some(p))
            && self.category.is_none_or(|c| goal.category == Some(c))
            && (!self.root_only || goal.is_root())
    }
}

/// Criteria for listing events.
///
/// `from`/`to` select events overlapping the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category: Option<CategoryId>,
    pub tag: Option<String>,
    pub all_day: Option<bool>,
}

impl EventFilter {
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.from.is_none_or(|from| event.end >= from)
            && self.to.is_none_or(|to| event.start <= to)
            && self.category.is_none_or(|c| event.category == Some(c))
            && self.tag.as_ref().is_none_or(|t| event.tags.contains(t))
            && self.all_day.is_none_or(|a| event.all_day == a)
    }
}

/// A goal with its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalNode {
    #[serde(flatten)]
    pub goal: Goal,
    pub children: Vec<GoalNode>,
}

fn build_nodes(goals: &[Goal], parent: Option<GoalId>) -> Vec<GoalNode> {
    let mut level: Vec<&Goal> = goals.iter().filter(|g| g.parent == parent).collect();
    level.sort_by_key(|g| (g.created_at, g.id));
    level
        .into_iter()
        .map(|g| GoalNode {
            goal: g.clone(),
            children: build_nodes(goals, Some(g.id)),
        })
        .collect()
}

// =============================================================================
// INPUT VALIDATION
// =============================================================================

/// Trim and bound a required text field.
fn clean_text(field: &str, raw: &str, max: usize) -> Result<String, WaypointError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WaypointError::InvalidInput(format!(
            "{} must not be empty",
            field
        )));
    }
    if trimmed.chars().count() > max {
        return Err(WaypointError::InvalidInput(format!(
            "{} exceeds {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

fn check_optional_text(field: &str, value: Option<&str>, max: usize) -> Result<(), WaypointError> {
    match value {
        Some(v) if v.chars().count() > max => Err(WaypointError::InvalidInput(format!(
            "{} exceeds {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

fn check_goal_dates(
    start: Option<DateTime<Utc>>,
    due: Option<DateTime<Utc>>,
) -> Result<(), WaypointError> {
    match (start, due) {
        (Some(start), Some(due)) if due < start => Err(WaypointError::InvalidDateRange(format!(
            "due date {} precedes start date {}",
            due.to_rfc3339(),
            start.to_rfc3339()
        ))),
        _ => Ok(()),
    }
}

fn check_event_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), WaypointError> {
    if end < start {
        return Err(WaypointError::InvalidDateRange(format!(
            "end {} precedes start {}",
            end.to_rfc3339(),
            start.to_rfc3339()
        )));
    }
    Ok(())
}

/// Trim tags, drop blanks, and enforce count and length limits.
fn clean_tags(tags: &BTreeSet<String>) -> Result<BTreeSet<String>, WaypointError> {
    let mut out = BTreeSet::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(WaypointError::InvalidInput(format!(
                "tag '{}' exceeds {} characters",
                tag, MAX_TAG_LENGTH
            )));
        }
        out.insert(tag.to_string());
    }
    if out.len() > MAX_TAGS {
        return Err(WaypointError::InvalidInput(format!(
            "{} tags exceed the limit of {}",
            out.len(),
            MAX_TAGS
        )));
    }
    Ok(out)
}

fn check_optional_color(color: Option<&str>) -> Result<(), WaypointError> {
    color.map_or(Ok(()), validate_color)
}

/// Normalize and check an event's own fields (references are checked separately).
fn clean_event(event: &mut Event) -> Result<(), WaypointError> {
    event.title = clean_text("title", &event.title, MAX_TITLE_LENGTH)?;
    check_optional_text(
        "description",
        event.description.as_deref(),
        MAX_DESCRIPTION_LENGTH,
    )?;
    check_optional_text("location", event.location.as_deref(), MAX_TITLE_LENGTH)?;
    check_event_range(event.start, event.end)?;
    check_optional_color(event.color.as_deref())?;
    event.tags = clean_tags(&event.tags)?;
    Ok(())
}

fn not_found(kind: RowKind, id: u64) -> WaypointError {
    WaypointError::NotFound { kind, id }
}

fn put_goals<'a, I>(changes: &mut Changeset, goals: &BTreeMap<GoalId, Goal>, ids: I)
where
    I: IntoIterator<Item = &'a GoalId>,
{
    for id in ids {
        if let Some(goal) = goals.get(id) {
            changes.put_goal(goal.clone());
        }
    }
}

// =============================================================================
// PLANNER
// =============================================================================

/// Validated, owner-scoped operations over a `Store`.
#[derive(Debug, Default)]
pub struct Planner<S = Backend> {
    store: S,
}

impl<S: Store> Planner<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn goal_map(&self, owner: OwnerId) -> Result<BTreeMap<GoalId, Goal>, WaypointError> {
        Ok(self
            .store
            .goals(owner)?
            .into_iter()
            .map(|g| (g.id, g))
            .collect())
    }

    fn check_category(
        &self,
        owner: OwnerId,
        category: Option<CategoryId>,
    ) -> Result<(), WaypointError> {
        match category {
            Some(id) => self.category(owner, id).map(|_| ()),
            None => Ok(()),
        }
    }

    fn current_profile(&self, owner: OwnerId, now: DateTime<Utc>) -> Result<Profile, WaypointError> {
        Ok(self
            .store
            .profile(owner)?
            .unwrap_or_else(|| Profile::new(owner, now)))
    }

    /// Append the refreshed profile stats for the post-mutation collections.
    fn refresh_stats<'a, G, E>(
        &self,
        owner: OwnerId,
        changes: &mut Changeset,
        goals: G,
        events: E,
        now: DateTime<Utc>,
    ) -> Result<(), WaypointError>
    where
        G: IntoIterator<Item = &'a Goal>,
        E: IntoIterator<Item = &'a Event>,
    {
        let goals: Vec<Goal> = goals.into_iter().cloned().collect();
        let events: Vec<Event> = events.into_iter().cloned().collect();
        let mut profile = self.current_profile(owner, now)?;
        profile.stats = stats::refresh(&profile.stats, &goals, &events, now);
        changes.put_profile(profile);
        Ok(())
    }

    // =========================================================================
    // GOALS
    // =========================================================================

    /// Fetch one goal.
    pub fn goal(&self, owner: OwnerId, id: GoalId) -> Result<Goal, WaypointError> {
        self.store
            .goal(owner, id)?
            .ok_or_else(|| not_found(RowKind::Goal, id.0))
    }

    /// List goals matching `filter`, ordered by creation time.
    pub fn goals(&self, owner: OwnerId, filter: &GoalFilter) -> Result<Vec<Goal>, WaypointError> {
        let mut goals: Vec<Goal> = self
            .store
            .goals(owner)?
            .into_iter()
            .filter(|g| filter.matches(g))
            .collect();
        goals.sort_by_key(|g| (g.created_at, g.id));
        Ok(goals)
    }

    /// Direct children of a goal.
    pub fn goal_children(&self, owner: OwnerId, id: GoalId) -> Result<Vec<Goal>, WaypointError> {
        self.goal(owner, id)?;
        Ok(hierarchy::children_of(&self.store.goals(owner)?, id))
    }

    /// Every root goal with its nested subtree.
    pub fn goal_tree(&self, owner: OwnerId) -> Result<Vec<GoalNode>, WaypointError> {
        Ok(build_nodes(&self.store.goals(owner)?, None))
    }

    /// Ancestors of a goal from the root down, ending with the goal.
    pub fn goal_path(&self, owner: OwnerId, id: GoalId) -> Result<Vec<Goal>, WaypointError> {
        self.goal(owner, id)?;
        Ok(hierarchy::path_to(&self.store.goals(owner)?, id))
    }

    pub fn goal_stats(&self, owner: OwnerId) -> Result<GoalStatistics, WaypointError> {
        Ok(dashboard::goal_statistics(&self.store.goals(owner)?))
    }

    /// Create a goal and propagate its progress to the ancestors.
    pub fn create_goal(
        &mut self,
        owner: OwnerId,
        input: NewGoal,
        now: DateTime<Utc>,
    ) -> Result<Goal, WaypointError> {
        let title = clean_text("title", &input.title, MAX_TITLE_LENGTH)?;
        check_optional_text(
            "description",
            input.description.as_deref(),
            MAX_DESCRIPTION_LENGTH,
        )?;
        check_goal_dates(input.start_date, input.due_date)?;
        self.check_category(owner, input.category)?;
        let parent = input.parent.map(|p| self.goal(owner, p)).transpose()?;
        hierarchy::validate_placement(input.level, parent.as_ref())?;

        let mut goals = self.goal_map(owner)?;
        let id = GoalId(self.store.allocate_id()?);
        let mut goal = Goal {
            id,
            owner,
            title,
            description: input.description,
            parent: input.parent,
            level: input.level,
            progress: input.progress,
            status: GoalStatus::Active,
            start_date: input.start_date,
            due_date: input.due_date,
            completed_at: None,
            category: input.category,
            created_at: now,
            updated_at: now,
        };
        goal.set_status(input.status, now);

        goals.insert(id, goal.clone());
        let ancestors = progress::propagate(&mut goals, goal.parent, now);

        let mut changes = Changeset::new();
        changes.put_goal(goal.clone());
        put_goals(&mut changes, &goals, &ancestors);
        let events = self.store.events(owner)?;
        self.refresh_stats(owner, &mut changes, goals.values(), &events, now)?;
        self.store.commit(owner, &changes)?;

        tracing::info!(
            owner = owner.0,
            goal = id.0,
            level = goal.level.value(),
            propagated = ancestors.len(),
            "goal created"
        );
        Ok(goal)
    }

    /// Apply a partial update.
    ///
    /// Reparenting and re-levelling are checked against the new parent and
    /// the goal's existing children. Both the old and the new parent chain
    /// are recomputed. An empty patch returns the stored row untouched.
    pub fn update_goal(
        &mut self,
        owner: OwnerId,
        id: GoalId,
        patch: GoalPatch,
        now: DateTime<Utc>,
    ) -> Result<Goal, WaypointError> {
        let current = self.goal(owner, id)?;
        if patch.is_empty() {
            return Ok(current);
        }

        let mut goals = self.goal_map(owner)?;
        let mut next = current.clone();

        if let Some(title) = &patch.title {
            next.title = clean_text("title", title, MAX_TITLE_LENGTH)?;
        }
        if let Some(description) = &patch.description {
            check_optional_text(
                "description",
                description.as_deref(),
                MAX_DESCRIPTION_LENGTH,
            )?;
            next.description.clone_from(description);
        }
        if let Some(start) = patch.start_date {
            next.start_date = start;
        }
        if let Some(due) = patch.due_date {
            next.due_date = due;
        }
        check_goal_dates(next.start_date, next.due_date)?;
        if let Some(category) = patch.category {
            self.check_category(owner, category)?;
            next.category = category;
        }
        if let Some(parent) = patch.parent {
            next.parent = parent;
        }
        if let Some(level) = patch.level {
            next.level = level;
        }
        if patch.parent.is_some() || patch.level.is_some() {
            let new_parent = next.parent.map(|p| self.goal(owner, p)).transpose()?;
            let children: Vec<Goal> = goals
                .values()
                .filter(|g| g.parent == Some(id))
                .cloned()
                .collect();
            hierarchy::validate_move(id, next.level, new_parent.as_ref(), &children)?;
        }
        if let Some(progress) = patch.progress {
            next.progress = progress;
        }
        if let Some(status) = patch.status {
            next.set_status(status, now);
        }
        next.updated_at = now;

        goals.insert(id, next.clone());
        let mut touched = BTreeSet::new();
        if current.parent != next.parent {
            touched.extend(progress::propagate(&mut goals, current.parent, now));
        }
        if patch.affects_parent() {
            touched.extend(progress::propagate(&mut goals, next.parent, now));
        }

        let mut changes = Changeset::new();
        changes.put_goal(next.clone());
        put_goals(&mut changes, &goals, &touched);
        let events = self.store.events(owner)?;
        self.refresh_stats(owner, &mut changes, goals.values(), &events, now)?;
        self.store.commit(owner, &changes)?;

        tracing::info!(
            owner = owner.0,
            goal = id.0,
            propagated = touched.len(),
            "goal updated"
        );
        Ok(next)
    }

    /// Delete a goal and its whole subtree. Returns every removed id, the
    /// requested goal first.
    pub fn delete_goal(
        &mut self,
        owner: OwnerId,
        id: GoalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<GoalId>, WaypointError> {
        let goal = self.goal(owner, id)?;
        let all = self.store.goals(owner)?;
        let mut removed = vec![id];
        removed.extend(hierarchy::descendants(&all, id));

        let mut goals: BTreeMap<GoalId, Goal> = all.into_iter().map(|g| (g.id, g)).collect();
        for gone in &removed {
            goals.remove(gone);
        }
        let ancestors = progress::propagate(&mut goals, goal.parent, now);

        let mut changes = Changeset::new();
        for gone in &removed {
            changes.push(Write::DeleteGoal(*gone));
        }
        put_goals(&mut changes, &goals, &ancestors);
        let events = self.store.events(owner)?;
        self.refresh_stats(owner, &mut changes, goals.values(), &events, now)?;
        self.store.commit(owner, &changes)?;

        tracing::info!(
            owner = owner.0,
            goal = id.0,
            removed = removed.len(),
            "goal deleted"
        );
        Ok(removed)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub fn event(&self, owner: OwnerId, id: EventId) -> Result<Event, WaypointError> {
        self.store
            .event(owner, id)?
            .ok_or_else(|| not_found(RowKind::Event, id.0))
    }

    /// List events matching `filter`, ordered by start time.
    pub fn events(
        &self,
        owner: OwnerId,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, WaypointError> {
        let mut events: Vec<Event> = self
            .store
            .events(owner)?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        events.sort_by_key(|e| (e.start, e.id));
        Ok(events)
    }

    pub fn create_event(
        &mut self,
        owner: OwnerId,
        input: NewEvent,
        now: DateTime<Utc>,
    ) -> Result<Event, WaypointError> {
        let mut event = Event {
            id: EventId(0),
            owner,
            title: input.title,
            description: input.description,
            start: input.start,
            end: input.end,
            all_day: input.all_day,
            category: input.category,
            tags: input.tags,
            color: input.color,
            location: input.location,
            created_at: now,
            updated_at: now,
        };
        clean_event(&mut event)?;
        self.check_category(owner, event.category)?;
        event.id = EventId(self.store.allocate_id()?);

        let mut events = self.store.events(owner)?;
        events.push(event.clone());
        let mut changes = Changeset::new();
        changes.put_event(event.clone());
        let goals = self.store.goals(owner)?;
        self.refresh_stats(owner, &mut changes, &goals, &events, now)?;
        self.store.commit(owner, &changes)?;

        tracing::info!(owner = owner.0, event = event.id.0, "event created");
        Ok(event)
    }

    /// Apply a partial update. An empty patch returns the stored row untouched.
    pub fn update_event(
        &mut self,
        owner: OwnerId,
        id: EventId,
        patch: EventPatch,
        now: DateTime<Utc>,
    ) -> Result<Event, WaypointError> {
        let current = self.event(owner, id)?;
        if patch.is_empty() {
            return Ok(current);
        }

        let mut next = current;
        if let Some(title) = patch.title {
            next.title = title;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(start) = patch.start {
            next.start = start;
        }
        if let Some(end) = patch.end {
            next.end = end;
        }
        if let Some(all_day) = patch.all_day {
            next.all_day = all_day;
        }
        if let Some(category) = patch.category {
            next.category = category;
        }
        if let Some(tags) = patch.tags {
            next.tags = tags;
        }
        if let Some(color) = patch.color {
            next.color = color;
        }
        if let Some(location) = patch.location {
            next.location = location;
        }
        clean_event(&mut next)?;
        self.check_category(owner, next.category)?;
        next.updated_at = now;

        let events: Vec<Event> = self
            .store
            .events(owner)?
            .into_iter()
            .map(|e| if e.id == id { next.clone() } else { e })
            .collect();
        let mut changes = Changeset::new();
        changes.put_event(next.clone());
        let goals = self.store.goals(owner)?;
        self.refresh_stats(owner, &mut changes, &goals, &events, now)?;
        self.store.commit(owner, &changes)?;

        tracing::info!(owner = owner.0, event = id.0, "event updated");
        Ok(next)
    }

    pub fn delete_event(
        &mut self,
        owner: OwnerId,
        id: EventId,
        now: DateTime<Utc>,
    ) -> Result<(), WaypointError> {
        self.event(owner, id)?;
        let events: Vec<Event> = self
            .store
            .events(owner)?
            .into_iter()
            .filter(|e| e.id != id)
            .collect();

        let mut changes = Changeset::new();
        changes.push(Write::DeleteEvent(id));
        let goals = self.store.goals(owner)?;
        self.refresh_stats(owner, &mut changes, &goals, &events, now)?;
        self.store.commit(owner, &changes)?;

        tracing::info!(owner = owner.0, event = id.0, "event deleted");
        Ok(())
    }

    // =========================================================================
    // CATEGORIES
    // =========================================================================

    pub fn category(&self, owner: OwnerId, id: CategoryId) -> Result<Category, WaypointError> {
        self.store
            .category(owner, id)?
            .ok_or_else(|| not_found(RowKind::Category, id.0))
    }

    /// All categories, ordered by name.
    pub fn categories(&self, owner: OwnerId) -> Result<Vec<Category>, WaypointError> {
        let mut categories = self.store.categories(owner)?;
        categories.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(categories)
    }

    /// Names are unique per owner (case-sensitive, after trimming).
    fn check_unique_name(
        &self,
        owner: OwnerId,
        name: &str,
        except: Option<CategoryId>,
    ) -> Result<(), WaypointError> {
        let taken = self
            .store
            .categories(owner)?
            .iter()
            .any(|c| c.name == name && Some(c.id) != except);
        if taken {
            return Err(WaypointError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    pub fn create_category(
        &mut self,
        owner: OwnerId,
        input: NewCategory,
        now: DateTime<Utc>,
    ) -> Result<Category, WaypointError> {
        let name = clean_text("name", &input.name, MAX_TITLE_LENGTH)?;
        validate_color(&input.color)?;
        self.check_unique_name(owner, &name, None)?;

        let category = Category {
            id: CategoryId(self.store.allocate_id()?),
            owner,
            name,
            color: input.color,
            created_at: now,
        };
        let mut changes = Changeset::new();
        changes.put_category(category.clone());
        self.store.commit(owner, &changes)?;

        tracing::info!(owner = owner.0, category = category.id.0, "category created");
        Ok(category)
    }

    pub fn update_category(
        &mut self,
        owner: OwnerId,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, WaypointError> {
        let mut category = self.category(owner, id)?;
        if let Some(name) = &patch.name {
            let name = clean_text("name", name, MAX_TITLE_LENGTH)?;
            self.check_unique_name(owner, &name, Some(id))?;
            category.name = name;
        }
        if let Some(color) = patch.color {
            validate_color(&color)?;
            category.color = color;
        }

        let mut changes = Changeset::new();
        changes.put_category(category.clone());
        self.store.commit(owner, &changes)?;
        Ok(category)
    }

    /// Delete a category, clearing it from every goal and event that used it.
    ///
    /// Returns how many goals and events were cleared.
    pub fn delete_category(
        &mut self,
        owner: OwnerId,
        id: CategoryId,
    ) -> Result<(usize, usize), WaypointError> {
        self.category(owner, id)?;

        let mut changes = Changeset::new();
        let mut goals_cleared = 0usize;
        for mut goal in self.store.goals(owner)? {
            if goal.category == Some(id) {
                goal.category = None;
                changes.put_goal(goal);
                goals_cleared = goals_cleared.saturating_add(1);
            }
        }
        let mut events_cleared = 0usize;
        for mut event in self.store.events(owner)? {
            if event.category == Some(id) {
                event.category = None;
                changes.put_event(event);
                events_cleared = events_cleared.saturating_add(1);
            }
        }
        changes.push(Write::DeleteCategory(id));
        self.store.commit(owner, &changes)?;

        tracing::info!(
            owner = owner.0,
            category = id.0,
            goals_cleared,
            events_cleared,
            "category deleted"
        );
        Ok((goals_cleared, events_cleared))
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    /// The owner's profile, created with defaults on first access.
    pub fn profile(&mut self, owner: OwnerId, now: DateTime<Utc>) -> Result<Profile, WaypointError> {
        if let Some(profile) = self.store.profile(owner)? {
            return Ok(profile);
        }
        let profile = Profile::new(owner, now);
        let mut changes = Changeset::new();
        changes.put_profile(profile.clone());
        self.store.commit(owner, &changes)?;
        tracing::debug!(owner = owner.0, "profile created");
        Ok(profile)
    }

    pub fn update_profile(
        &mut self,
        owner: OwnerId,
        patch: ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<Profile, WaypointError> {
        let mut profile = self.current_profile(owner, now)?;
        if let Some(display_name) = patch.display_name {
            check_optional_text("display name", display_name.as_deref(), MAX_TITLE_LENGTH)?;
            profile.display_name = display_name;
        }
        if let Some(avatar_url) = patch.avatar_url {
            check_optional_text("avatar url", avatar_url.as_deref(), MAX_DESCRIPTION_LENGTH)?;
            profile.avatar_url = avatar_url;
        }
        if let Some(bio) = patch.bio {
            check_optional_text("bio", bio.as_deref(), MAX_DESCRIPTION_LENGTH)?;
            profile.bio = bio;
        }
        if let Some(timezone) = patch.timezone {
            profile.timezone = clean_text("timezone", &timezone, MAX_TITLE_LENGTH)?;
        }
        profile.updated_at = now;

        let mut changes = Changeset::new();
        changes.put_profile(profile.clone());
        self.store.commit(owner, &changes)?;
        Ok(profile)
    }

    /// Replace the whole preferences document.
    pub fn update_preferences(
        &mut self,
        owner: OwnerId,
        preferences: Preferences,
        now: DateTime<Utc>,
    ) -> Result<Profile, WaypointError> {
        let mut profile = self.current_profile(owner, now)?;
        let language = clean_text("language", &preferences.language, MAX_TAG_LENGTH)?;
        profile.preferences = Preferences {
            language,
            ..preferences
        };
        profile.updated_at = now;

        let mut changes = Changeset::new();
        changes.put_profile(profile.clone());
        self.store.commit(owner, &changes)?;
        Ok(profile)
    }

    // =========================================================================
    // DASHBOARD
    // =========================================================================

    pub fn dashboard(
        &self,
        owner: OwnerId,
        now: DateTime<Utc>,
        overdue_limit: Option<usize>,
    ) -> Result<Dashboard, WaypointError> {
        let goals = self.store.goals(owner)?;
        let events = self.store.events(owner)?;
        Ok(dashboard::build(&goals, &events, now, overdue_limit))
    }

    pub fn today(&self, owner: OwnerId, now: DateTime<Utc>) -> Result<Vec<TodayItem>, WaypointError> {
        let goals = self.store.goals(owner)?;
        let events = self.store.events(owner)?;
        Ok(dashboard::today(&goals, &events, now))
    }

    pub fn overdue(
        &self,
        owner: OwnerId,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<OverdueItem>, WaypointError> {
        let goals = self.store.goals(owner)?;
        let events = self.store.events(owner)?;
        Ok(dashboard::overdue(&goals, &events, now, limit))
    }

    pub fn metrics(
        &self,
        owner: OwnerId,
        now: DateTime<Utc>,
    ) -> Result<ProductivityMetrics, WaypointError> {
        let goals = self.store.goals(owner)?;
        let events = self.store.events(owner)?;
        Ok(dashboard::metrics(&goals, &events, now))
    }

    // =========================================================================
    // EXPORT / IMPORT
    // =========================================================================

    /// Everything the owner has, ordered by id.
    pub fn export(&self, owner: OwnerId, now: DateTime<Utc>) -> Result<Snapshot, WaypointError> {
        Ok(Snapshot::new(
            now,
            self.store.goals(owner)?,
            self.store.events(owner)?,
            self.store.categories(owner)?,
            self.store.profile(owner)?,
        ))
    }

    /// Load a snapshot into the caller's account.
    ///
    /// Every row gets a fresh id and the caller as owner; parent and category
    /// references are remapped. Categories whose name already exists are
    /// merged into the existing one. Parent progress is rebuilt from the
    /// imported leaves. The whole import is one commit.
    pub fn import(
        &mut self,
        owner: OwnerId,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<ImportReport, WaypointError> {
        snapshot.validate()?;
        let mut report = ImportReport::default();
        let mut changes = Changeset::new();

        // Categories first: goals and events point at them.
        let mut by_name: BTreeMap<String, CategoryId> = self
            .store
            .categories(owner)?
            .into_iter()
            .map(|c| (c.name, c.id))
            .collect();
        let mut category_ids: BTreeMap<CategoryId, CategoryId> = BTreeMap::new();
        for category in &snapshot.categories {
            let name = clean_text("name", &category.name, MAX_TITLE_LENGTH)?;
            validate_color(&category.color)?;
            let id = match by_name.get(&name) {
                Some(existing) => *existing,
                None => {
                    let id = CategoryId(self.store.allocate_id()?);
                    changes.put_category(Category {
                        id,
                        owner,
                        name: name.clone(),
                        color: category.color.clone(),
                        created_at: category.created_at,
                    });
                    by_name.insert(name, id);
                    report.categories = report.categories.saturating_add(1);
                    id
                }
            };
            category_ids.insert(category.id, id);
        }
        let remap_category = |old: Option<CategoryId>| -> Result<Option<CategoryId>, WaypointError> {
            old.map(|c| {
                category_ids.get(&c).copied().ok_or_else(|| {
                    WaypointError::InvalidInput(format!("unknown category {} in snapshot", c.0))
                })
            })
            .transpose()
        };

        // Goals parent-first so every parent is placed before its children.
        let mut ordered: Vec<&Goal> = snapshot.goals.iter().collect();
        ordered.sort_by_key(|g| (g.level, g.created_at, g.id));
        let mut goals = self.goal_map(owner)?;
        let mut goal_ids: BTreeMap<GoalId, GoalId> = BTreeMap::new();
        for source in ordered {
            let title = clean_text("title", &source.title, MAX_TITLE_LENGTH)?;
            check_optional_text(
                "description",
                source.description.as_deref(),
                MAX_DESCRIPTION_LENGTH,
            )?;
            check_goal_dates(source.start_date, source.due_date)?;
            let parent = match source.parent {
                Some(old) => Some(*goal_ids.get(&old).ok_or_else(|| {
                    WaypointError::InvalidInput(format!(
                        "goal {} references unknown parent {}",
                        source.id.0, old.0
                    ))
                })?),
                None => None,
            };
            hierarchy::validate_placement(source.level, parent.and_then(|p| goals.get(&p)))?;

            let id = GoalId(self.store.allocate_id()?);
            goal_ids.insert(source.id, id);
            goals.insert(
                id,
                Goal {
                    id,
                    owner,
                    title,
                    parent,
                    category: remap_category(source.category)?,
                    ..source.clone()
                },
            );
            report.goals = report.goals.saturating_add(1);
        }
        progress::settle(&mut goals, now);
        let imported: BTreeSet<GoalId> = goal_ids.values().copied().collect();
        put_goals(&mut changes, &goals, &imported);

        let mut events = self.store.events(owner)?;
        for source in &snapshot.events {
            let mut event = Event {
                id: EventId(0),
                owner,
                category: remap_category(source.category)?,
                ..source.clone()
            };
            clean_event(&mut event)?;
            event.id = EventId(self.store.allocate_id()?);
            changes.put_event(event.clone());
            events.push(event);
            report.events = report.events.saturating_add(1);
        }

        let mut profile = self.current_profile(owner, now)?;
        if let Some(source) = &snapshot.profile {
            profile.display_name.clone_from(&source.display_name);
            profile.avatar_url.clone_from(&source.avatar_url);
            profile.bio.clone_from(&source.bio);
            profile.timezone.clone_from(&source.timezone);
            profile.preferences = source.preferences.clone();
            profile.updated_at = now;
            report.profile = true;
        }
        let goal_rows: Vec<Goal> = goals.into_values().collect();
        profile.stats = stats::refresh(&profile.stats, &goal_rows, &events, now);
        changes.put_profile(profile);

        self.store.commit(owner, &changes)?;
        tracing::info!(
            owner = owner.0,
            goals = report.goals,
            events = report.events,
            categories = report.categories,
            "snapshot imported"
        );
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, event, goal};

    #[test]
    fn clean_text_trims_and_bounds() {
        assert_eq!(clean_text("title", "  Run  ", 10).expect("clean"), "Run");
        assert!(matches!(
            clean_text("title", "   ", 10),
            Err(WaypointError::InvalidInput(_))
        ));
        assert!(clean_text("title", &"x".repeat(11), 10).is_err());
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = BTreeSet::from([
            " work ".to_string(),
            "work".to_string(),
            "  ".to_string(),
            "deep".to_string(),
        ]);
        let cleaned = clean_tags(&tags).expect("tags");
        assert_eq!(
            cleaned,
            BTreeSet::from(["deep".to_string(), "work".to_string()])
        );

        let too_long = BTreeSet::from(["t".repeat(MAX_TAG_LENGTH + 1)]);
        assert!(clean_tags(&too_long).is_err());
    }

    #[test]
    fn goal_dates_must_be_ordered() {
        assert!(check_goal_dates(Some(at(10)), Some(at(5))).is_err());
        assert!(check_goal_dates(Some(at(5)), Some(at(5))).is_ok());
        assert!(check_goal_dates(None, Some(at(5))).is_ok());
    }

    #[test]
    fn goal_filter_combines_criteria() {
        let root = goal(1, None, Level::LongTerm);
        let mut child = goal(2, Some(1), Level::Yearly);
        child.status = GoalStatus::Paused;

        let roots = GoalFilter {
            root_only: true,
            ..GoalFilter::default()
        };
        assert!(roots.matches(&root));
        assert!(!roots.matches(&child));

        let paused_under_root = GoalFilter {
            parent: Some(GoalId(1)),
            status: Some(GoalStatus::Paused),
            ..GoalFilter::default()
        };
        assert!(paused_under_root.matches(&child));
        assert!(!paused_under_root.matches(&root));
    }

    #[test]
    fn event_filter_selects_overlapping_window() {
        let mut meeting = event(1, at(60), at(120));
        meeting.tags.insert("work".to_string());

        let window = EventFilter {
            from: Some(at(90)),
            to: Some(at(200)),
            ..EventFilter::default()
        };
        assert!(window.matches(&meeting));

        let later = EventFilter {
            from: Some(at(121)),
            ..EventFilter::default()
        };
        assert!(!later.matches(&meeting));

        let tagged = EventFilter {
            tag: Some("home".to_string()),
            ..EventFilter::default()
        };
        assert!(!tagged.matches(&meeting));
    }

    #[test]
    fn tree_nests_children_in_creation_order() {
        let mut late = goal(3, Some(1), Level::Yearly);
        late.created_at = at(5);
        let goals = vec![
            goal(1, None, Level::LongTerm),
            late,
            goal(2, Some(1), Level::Yearly),
            goal(4, Some(2), Level::Monthly),
        ];

        let tree = build_nodes(&goals, None);
        assert_eq!(tree.len(), 1);
        let ids: Vec<GoalId> = tree[0].children.iter().map(|n| n.goal.id).collect();
        assert_eq!(ids, vec![GoalId(2), GoalId(3)]);
        assert_eq!(tree[0].children[0].children[0].goal.id, GoalId(4));
    }
}
