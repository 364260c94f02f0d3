//! Query construction and count resolution for [`DataTable`].
//!
//! From one base query the pipeline derives a count query, a filtered query
//! and finally the ordered, paged query that is fetched. Every derivation
//! starts from a clone, so nothing leaks back into the base.

use tracing::debug;

use crate::Row;
use crate::config::{Config, ShapeDetection};
use crate::detect::detect_shape;
use crate::error::{DataTableError, Result};
use crate::query::{ClauseKind, Condition, TableQuery, Target};
use crate::request::{Search, SortDirection};
use crate::source::DataSource;
use crate::table::{DataTable, RecordCount};

/// Ordering column expected on every branch of a UNION base query.
pub(crate) const UNION_ORDER: &str = "union_order";

/// Alias of the derived table used to count grouped rows.
const GROUP_COUNT_ALIAS: &str = "subquery";

/// Alias of the derived table a UNION base is filtered through.
const UNION_ALIAS: &str = "union_table";

impl DataTable {
    /// Build, count and fetch. Returns the rows, both counts and the config
    /// after shape detection.
    pub(crate) async fn process<S: DataSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<(Vec<Row>, i64, i64, Config)> {
        let base = self.build_base()?;

        let mut config = self.config.clone();
        if config.shape_detection != ShapeDetection::Off {
            detect_shape(&source.dry_run(&base)).apply_to(&mut config);
        }

        let count_query = self.build_count(&base, &config);
        let filtered_query = self.build_filtered(&base, &config);

        let total = self.total_count(source, count_query).await?;
        let filtered = self.filtered_count(source, &filtered_query, &config).await?;

        let query = self.apply_order(filtered_query, &config);
        let query = self.apply_pagination(query, &config);
        let rows = self.execute(source, &query).await?;

        Ok((rows, total, filtered, config))
    }

    /// Base query: bound target, relation preloads, then every filter hook in
    /// registration order.
    pub(crate) fn build_base(&self) -> Result<TableQuery> {
        let mut base = match (&self.source, &self.model) {
            (Some(source), Some(model)) => source.clone().bind_model(model.clone()),
            (Some(source), None) => match source.target() {
                Some(Target::Table(_)) if !source.selects().is_empty() => {
                    let selection = strip_keyword(&source.selects().join(", "), "SELECT");
                    let base = source.clone().clear_selects();
                    if selection.is_empty() {
                        base
                    } else {
                        base.select(selection)
                    }
                }
                Some(_) => source.clone(),
                None => return Err(DataTableError::MissingModel),
            },
            (None, Some(model)) => TableQuery::model(model.clone()),
            (None, None) => return Err(DataTableError::NoSource),
        };

        if !self.relations.is_empty() && !base.has_joins() {
            for relation in &self.relations {
                base = base.preload(relation.clone());
            }
        }

        for filter in &self.filters {
            base = filter(base);
        }
        Ok(base)
    }

    /// Count query; DISTINCT shapes count distinct primary keys.
    pub(crate) fn build_count(&self, base: &TableQuery, config: &Config) -> TableQuery {
        let query = base.clone();
        if !config.distinct {
            return query;
        }
        let key = query.bound_model().map_or("id", |m| m.key()).to_string();
        query.distinct_on([key])
    }

    /// Filtered query: search predicates, then the configured GROUP BY and
    /// HAVING, replacing whatever grouping the base carried. A UNION base is
    /// wrapped first so predicates see every branch.
    pub(crate) fn build_filtered(&self, base: &TableQuery, config: &Config) -> TableQuery {
        let mut query = self.apply_search(union_wrapped(base, config), config);
        query = self.apply_column_search(query, config);

        if !config.group_by.is_empty() {
            let columns: Vec<String> = config
                .group_by
                .iter()
                .map(|c| strip_keyword(c, "GROUP BY"))
                .filter(|c| !c.is_empty())
                .collect();
            query = query.clear_group_by().group_by(columns);

            if !config.having.is_empty() {
                query = query.clear_having();
                for condition in &config.having {
                    let condition = strip_keyword(condition, "HAVING");
                    if !condition.is_empty() {
                        query = query.having(Condition::raw(condition));
                    }
                }
            }
        }
        query
    }

    /// Global search: one predicate per allowed, searchable request column,
    /// OR-combined.
    pub(crate) fn apply_search(&self, query: TableQuery, config: &Config) -> TableQuery {
        let search = &self.request.search;
        if !config.searchable || search.is_empty() {
            return query;
        }

        let predicates: Vec<Condition> = self
            .request
            .columns
            .iter()
            .filter(|c| self.columns.is_allowed(&c.data))
            .filter_map(|c| self.columns.get(&c.data))
            .filter(|column| column.searchable)
            .map(|column| search_predicate(column.storage_name(), search, config))
            .collect();

        if predicates.is_empty() {
            return query;
        }
        debug!(columns = predicates.len(), "applying global search");
        query.filter(Condition::any(predicates))
    }

    /// Per-column search values, AND-combined with everything else.
    pub(crate) fn apply_column_search(&self, mut query: TableQuery, config: &Config) -> TableQuery {
        if !config.searchable || !config.column_search {
            return query;
        }
        for request_column in &self.request.columns {
            if request_column.search.is_empty() || !self.columns.is_allowed(&request_column.data) {
                continue;
            }
            let Some(column) = self.columns.get(&request_column.data) else {
                continue;
            };
            if column.searchable {
                query = query.filter(search_predicate(
                    column.storage_name(),
                    &request_column.search,
                    config,
                ));
            }
        }
        query
    }

    /// Total records: cached, or the count query with any HAVING removed.
    pub(crate) async fn total_count<S: DataSource + ?Sized>(
        &self,
        source: &S,
        query: TableQuery,
    ) -> Result<i64> {
        if let RecordCount::Cached(count) = self.total {
            return Ok(count);
        }
        let query = if query.has_clause(ClauseKind::Having) {
            query.clear_having()
        } else {
            query
        };
        Ok(source.count(&query).await?)
    }

    /// Filtered records: cached, the number of groups for grouped shapes, or
    /// a plain count.
    pub(crate) async fn filtered_count<S: DataSource + ?Sized>(
        &self,
        source: &S,
        query: &TableQuery,
        config: &Config,
    ) -> Result<i64> {
        if let RecordCount::Cached(count) = self.filtered {
            return Ok(count);
        }
        if config.group_by.is_empty() {
            return Ok(source.count(query).await?);
        }

        let wrapper = TableQuery::subquery(query.clone().unpaged(), GROUP_COUNT_ALIAS)
            .select("COUNT(*) AS count");
        Ok(source.scalar(&wrapper).await?)
    }

    pub(crate) fn apply_order(&self, mut query: TableQuery, config: &Config) -> TableQuery {
        if !config.orderable {
            return query;
        }
        if config.union {
            return query.order_by(UNION_ORDER, SortDirection::Asc);
        }

        for order in &self.request.order {
            let Some(request_column) = self.request.columns.get(order.column) else {
                continue;
            };
            if !self.columns.is_allowed(&request_column.data) {
                continue;
            }
            match self.columns.get(&request_column.data) {
                Some(column) if column.orderable => {
                    query = query.order_by(column.storage_name(), order.direction());
                }
                _ => {}
            }
        }

        if self.request.order.is_empty() {
            for (key, direction) in &config.default_sort {
                let Some(column) = self.columns.get(key) else {
                    continue;
                };
                let name = column.storage_name();
                if !name.is_empty() {
                    query = query.order_by(name, *direction);
                }
            }
        }
        query
    }

    /// OFFSET `start` and LIMIT `length`. Negative `start` reads as 0 and a
    /// negative `length` means no limit; a zero length is kept.
    pub(crate) fn apply_pagination(&self, query: TableQuery, config: &Config) -> TableQuery {
        if !config.paginate {
            return query;
        }
        let query = query.offset(u64::try_from(self.request.start).unwrap_or(0));
        match u64::try_from(self.request.length) {
            Ok(length) => query.limit(length),
            Err(_) => query,
        }
    }

    pub(crate) async fn execute<S: DataSource + ?Sized>(
        &self,
        source: &S,
        query: &TableQuery,
    ) -> Result<Vec<Row>> {
        Ok(source.fetch(query).await?)
    }
}

/// `base` as a derived table when it is a UNION, with preloads moved to the
/// outer query; otherwise a plain clone.
fn union_wrapped(base: &TableQuery, config: &Config) -> TableQuery {
    if !config.union && !base.has_clause(ClauseKind::Union) {
        return base.clone();
    }
    let preloads = base.preloads().to_vec();
    let wrapped = TableQuery::subquery(base.clone().clear_preloads(), UNION_ALIAS);
    preloads.into_iter().fold(wrapped, |query, name| query.preload(name))
}

fn search_predicate(column: &str, search: &Search, config: &Config) -> Condition {
    if search.regex {
        Condition::regex(column, search.value.clone(), config.case_insensitive)
    } else {
        Condition::contains(column, &search.value, config.case_insensitive)
    }
}

/// Trim `text` and drop a leading `keyword` (ASCII case-insensitive, whole
/// word only).
fn strip_keyword(text: &str, keyword: &str) -> String {
    let text = text.trim();
    let Some((head, rest)) = text.split_at_checked(keyword.len()) else {
        return text.to_string();
    };
    if head.eq_ignore_ascii_case(keyword) && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        rest.trim().to_string()
    } else {
        text.to_string()
    }
}
