//! Query handle composed by the table pipeline.
//!
//! [`TableQuery`] is an owned description of a SELECT: its target, selection,
//! joins, predicates, grouping, unions, ordering, pagination and relation
//! preloads. Clauses are kept per kind so the pipeline can ask what is
//! already attached before adding more. Cloning a query is the isolated
//! session every derived query starts from.
//!
//! SQL text is produced through SeaQuery (see [`render`]); execution belongs
//! to a [`DataSource`](crate::source::DataSource).

mod condition;
mod render;

pub use condition::{CompareOp, Condition, escape_like_wildcards};
pub use render::{Backend, COUNT_ALIAS, is_plain_identifier};

/// What a query selects from.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A bare table identifier.
    Table(String),
    /// A structured model with a primary key and declared relations.
    Model(Model),
    /// A derived table.
    Subquery { query: Box<TableQuery>, alias: String },
}

impl Target {
    /// Table name for table and model targets.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Target::Table(name) => Some(name),
            Target::Model(model) => Some(model.table()),
            Target::Subquery { .. } => None,
        }
    }
}

/// A table together with the metadata the pipeline needs beyond its name.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    table: String,
    primary_key: String,
    relations: Vec<Relation>,
}

impl Model {
    /// A model over `table` with primary key `id`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            relations: Vec::new(),
        }
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &str {
        &self.primary_key
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn find_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// A one-to-many association that can be preloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Key the child rows are attached under.
    pub name: String,
    /// Child table.
    pub table: String,
    /// Column in the child table pointing at the parent.
    pub foreign_key: String,
    /// Parent column matched by `foreign_key`; the model key when unset.
    pub local_key: Option<String>,
}

impl Relation {
    pub fn has_many(
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            foreign_key: foreign_key.into(),
            local_key: None,
        }
    }

    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

/// Join condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOn {
    /// `left = right`, both column references.
    Columns(String, String),
    /// Raw SQL condition.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub on: JoinOn,
}

impl Join {
    pub fn inner(table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            kind: JoinKind::Inner,
            table: table.into(),
            alias: None,
            on: JoinOn::Columns(left.into(), right.into()),
        }
    }

    pub fn left(table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            kind: JoinKind::Left,
            ..Self::inner(table, left, right)
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// GROUP BY expressions with the HAVING conditions attached to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupBy {
    pub columns: Vec<String>,
    pub having: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub all: bool,
    pub query: TableQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: crate::SortDirection,
}

/// Clause families a query may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Select,
    Distinct,
    Join,
    Where,
    GroupBy,
    Having,
    Union,
    OrderBy,
    Limit,
    Offset,
    Preload,
}

/// Owned, cloneable SELECT description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableQuery {
    target: Option<Target>,
    selects: Vec<String>,
    distinct: Option<Vec<String>>,
    joins: Vec<Join>,
    conditions: Vec<Condition>,
    group_by: Option<GroupBy>,
    unions: Vec<Union>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    preloads: Vec<String>,
}

impl TableQuery {
    /// A query with no target yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// `SELECT ... FROM <name>`.
    pub fn table(name: impl Into<String>) -> Self {
        Self::new().bind_table(name)
    }

    /// `SELECT ... FROM <model table>`.
    pub fn model(model: Model) -> Self {
        Self::new().bind_model(model)
    }

    /// `SELECT ... FROM (<query>) AS <alias>`.
    pub fn subquery(query: TableQuery, alias: impl Into<String>) -> Self {
        Self {
            target: Some(Target::Subquery {
                query: Box::new(query),
                alias: alias.into(),
            }),
            ..Self::default()
        }
    }

    pub fn bind_table(mut self, name: impl Into<String>) -> Self {
        self.target = Some(Target::Table(name.into()));
        self
    }

    pub fn bind_model(mut self, model: Model) -> Self {
        self.target = Some(Target::Model(model));
        self
    }

    /// Append a select expression (raw SQL, e.g. `id, name` or `COUNT(*) AS count`).
    pub fn select(mut self, expr: impl Into<String>) -> Self {
        self.selects.push(expr.into());
        self
    }

    pub fn select_all<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selects.extend(exprs.into_iter().map(Into::into));
        self
    }

    /// `SELECT DISTINCT` over the current selection.
    pub fn distinct(mut self) -> Self {
        self.distinct = Some(Vec::new());
        self
    }

    /// `SELECT DISTINCT <columns>`; counts become `COUNT(DISTINCT ...)`.
    pub fn distinct_on<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.distinct = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn inner_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join(Join::inner(table, left, right))
    }

    pub fn left_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join(Join::left(table, left, right))
    }

    /// Add a predicate; predicates are AND-combined.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by
            .get_or_insert_with(GroupBy::default)
            .columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, condition: Condition) -> Self {
        self.group_by
            .get_or_insert_with(GroupBy::default)
            .having
            .push(condition);
        self
    }

    pub fn union(mut self, query: TableQuery) -> Self {
        self.unions.push(Union { all: false, query });
        self
    }

    pub fn union_all(mut self, query: TableQuery) -> Self {
        self.unions.push(Union { all: true, query });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: crate::SortDirection) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Request a relation to be loaded alongside the rows.
    pub fn preload(mut self, relation: impl Into<String>) -> Self {
        self.preloads.push(relation.into());
        self
    }

    pub fn clear_selects(mut self) -> Self {
        self.selects.clear();
        self
    }

    pub fn clear_joins(mut self) -> Self {
        self.joins.clear();
        self
    }

    /// Drop the GROUP BY expressions, keeping any HAVING conditions.
    pub fn clear_group_by(mut self) -> Self {
        if let Some(group) = &mut self.group_by {
            group.columns.clear();
        }
        self.prune_group_by();
        self
    }

    pub fn clear_having(mut self) -> Self {
        if let Some(group) = &mut self.group_by {
            group.having.clear();
        }
        self.prune_group_by();
        self
    }

    pub fn clear_preloads(mut self) -> Self {
        self.preloads.clear();
        self
    }

    pub fn clear_order(mut self) -> Self {
        self.order.clear();
        self
    }

    /// Drop ORDER BY, LIMIT and OFFSET.
    pub fn unpaged(mut self) -> Self {
        self.order.clear();
        self.limit = None;
        self.offset = None;
        self
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// The bound model, if the target is one or wraps one.
    pub fn bound_model(&self) -> Option<&Model> {
        match &self.target {
            Some(Target::Model(model)) => Some(model),
            Some(Target::Subquery { query, .. }) => query.bound_model(),
            _ => None,
        }
    }

    pub fn selects(&self) -> &[String] {
        &self.selects
    }

    /// `None` without DISTINCT; an empty list for a bare DISTINCT.
    pub fn distinct_columns(&self) -> Option<&[String]> {
        self.distinct.as_deref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn group(&self) -> Option<&GroupBy> {
        self.group_by.as_ref()
    }

    pub fn unions(&self) -> &[Union] {
        &self.unions
    }

    pub fn orders(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    pub fn has_clause(&self, kind: ClauseKind) -> bool {
        match kind {
            ClauseKind::Select => !self.selects.is_empty(),
            ClauseKind::Distinct => self.distinct.is_some(),
            ClauseKind::Join => !self.joins.is_empty(),
            ClauseKind::Where => !self.conditions.is_empty(),
            ClauseKind::GroupBy => self.group_by.as_ref().is_some_and(|g| !g.columns.is_empty()),
            ClauseKind::Having => self.group_by.as_ref().is_some_and(|g| !g.having.is_empty()),
            ClauseKind::Union => !self.unions.is_empty(),
            ClauseKind::OrderBy => !self.order.is_empty(),
            ClauseKind::Limit => self.limit.is_some(),
            ClauseKind::Offset => self.offset.is_some(),
            ClauseKind::Preload => !self.preloads.is_empty(),
        }
    }

    /// Every clause kind currently attached.
    pub fn clauses(&self) -> Vec<ClauseKind> {
        [
            ClauseKind::Select,
            ClauseKind::Distinct,
            ClauseKind::Join,
            ClauseKind::Where,
            ClauseKind::GroupBy,
            ClauseKind::Having,
            ClauseKind::Union,
            ClauseKind::OrderBy,
            ClauseKind::Limit,
            ClauseKind::Offset,
            ClauseKind::Preload,
        ]
        .into_iter()
        .filter(|kind| self.has_clause(*kind))
        .collect()
    }

    fn prune_group_by(&mut self) {
        if self
            .group_by
            .as_ref()
            .is_some_and(|g| g.columns.is_empty() && g.having.is_empty())
        {
            self.group_by = None;
        }
    }
}
