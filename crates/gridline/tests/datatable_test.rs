#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end DataTable tests against the in-memory source.
//!
//! Each test builds a request the way the browser sends it, runs the table
//! and checks both the response and the statements the source received.

use gridline::source::memory::Operation;
use gridline::{
    Column, Condition, DataTable, DataTableError, MemorySource, Model, Relation, Request,
    ResponseFormat, SortDirection, TableQuery,
};
use gridline_test_utils::{DtParams, assert, people, posts, test_person};
use serde_json::{Value, json};

fn source(n: usize) -> MemorySource {
    MemorySource::new()
        .with_table("people", people(n))
        .with_table("posts", posts(n, 2))
}

fn request(params: &DtParams) -> Request {
    Request::from_params(&params.to_map()).unwrap()
}

fn data(response: &gridline::Response) -> Value {
    Value::Array(response.data.clone())
}

// -------------------------------------------------------------------------
// Counting and paging
// -------------------------------------------------------------------------

#[tokio::test]
async fn search_counts_and_pages() {
    let source = source(100);
    let params = DtParams::new(1)
        .page(10, 10)
        .search("John")
        .column("id")
        .column("name")
        .column("age");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.draw, 1);
    assert_eq!(response.records_total, 100);
    assert_eq!(response.records_filtered, 50);
    assert_eq!(response.data.len(), 10);
    // Johns sit at odd ids; the page starts at the eleventh match.
    assert::ids(&data(&response), &[21, 23, 25, 27, 29, 31, 33, 35, 37, 39]);

    let stats = source.stats();
    assert_eq!((stats.counts, stats.scalars, stats.fetches), (2, 0, 1));
    let fetch = stats.statements.last().unwrap();
    assert::contains(fetch, r#"CAST("name" AS TEXT) LIKE '%John%'"#);
    assert::contains(fetch, r#"ORDER BY "id" ASC LIMIT 10 OFFSET 10"#);
}

#[tokio::test]
async fn zero_length_returns_no_rows_but_counts() {
    let source = source(100);
    let params = DtParams::new(2).page(0, 0).column("id").column("name");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert!(response.data.is_empty());
    assert_eq!(response.records_total, 100);
    assert_eq!(response.records_filtered, 100);
}

#[tokio::test]
async fn negative_length_returns_everything() {
    let source = source(25);
    let params = DtParams::new(1).page(-3, -1).column("id");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.data.len(), 25);
}

#[tokio::test]
async fn cached_counts_skip_count_queries() {
    let source = source(30);
    let params = DtParams::new(1).column("id");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .set_total_records(1000)
        .set_filtered_records(500)
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.records_total, 1000);
    assert_eq!(response.records_filtered, 500);

    let stats = source.stats();
    assert_eq!(stats.counts, 0);
    assert_eq!(stats.scalars, 0);
    assert_eq!(stats.fetches, 1);
}

#[tokio::test]
async fn base_filters_apply_to_every_query() {
    let source = source(40);
    let params = DtParams::new(1).column("id").column("team");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .filter(|q| q.filter(Condition::eq("team", "red")))
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.records_total, 14);
    assert_eq!(response.records_filtered, 14);
    for statement in source.stats().statements {
        assert::contains(&statement, r#""team" = 'red'"#);
    }
}

// -------------------------------------------------------------------------
// Grouping
// -------------------------------------------------------------------------

#[tokio::test]
async fn grouped_base_counts_groups() {
    let source = source(10);
    let params = DtParams::new(1).column("age");

    let response = DataTable::new(TableQuery::table("people").group_by(["age"]))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.records_filtered, 4);
    assert_eq!(
        data(&response),
        json!([{"age": 20}, {"age": 30}, {"age": 40}, {"age": 50}])
    );

    let stats = source.stats();
    assert_eq!(stats.scalars, 1);
    let scalar = stats
        .statements
        .iter()
        .find(|s| s.contains(r#"AS "subquery""#))
        .expect("count-of-groups statement");
    assert::contains(scalar, "COUNT(*) AS count");
    assert::contains(scalar, r#"GROUP BY "age""#);
}

#[tokio::test]
async fn declared_grouping_without_detection() {
    let source = source(12);
    let params = DtParams::new(1).column("team");
    let config = gridline::Config {
        shape_detection: gridline::ShapeDetection::Off,
        ..gridline::Config::default()
    };

    let response = DataTable::new(TableQuery::table("people"))
        .config(config)
        .group_by(["GROUP BY team"])
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.records_total, 12);
    assert_eq!(response.records_filtered, 3);
    assert_eq!(response.data.len(), 3);
}

#[tokio::test]
async fn grouped_base_with_having() {
    let source = source(10);
    let params = DtParams::new(1).column("team").column("members");
    let base = TableQuery::table("people")
        .select("team, COUNT(*) AS members")
        .group_by(["team"])
        .having(Condition::gt("members", 3));

    let response = DataTable::new(base)
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    // The total ignores HAVING; the filtered count honours it.
    assert_eq!(response.records_total, 3);
    assert_eq!(response.records_filtered, 1);
    assert_eq!(data(&response), json!([{"team": "red", "members": 4}]));

    let stats = source.stats();
    let total = stats.statements.first().unwrap();
    assert::not_contains(total, "HAVING");
    let scalar = stats
        .statements
        .iter()
        .find(|s| s.contains(r#"AS "subquery""#))
        .expect("count-of-groups statement");
    assert::contains(scalar, r#"HAVING "members" > 3"#);
}

// -------------------------------------------------------------------------
// Union and distinct bases
// -------------------------------------------------------------------------

fn staff() -> Vec<serde_json::Map<String, Value>> {
    ["Mary Staff A", "Mary Staff B", "Mary Staff C", "Bob Staff D", "Bob Staff E"]
        .iter()
        .zip(101..)
        .map(|(name, id)| test_person(id, name).into_row())
        .collect()
}

#[tokio::test]
async fn union_base_is_searched_across_branches() {
    let source = source(10).with_table("staff", staff());
    let params = DtParams::new(1).search("Mary").column("id").column("name");
    let base = TableQuery::table("people")
        .select("id, name")
        .union_all(TableQuery::table("staff").select("id, name"));

    let response = DataTable::new(base)
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.records_total, 15);
    assert_eq!(response.records_filtered, 8);

    let mut ids: Vec<i64> = response.data.iter().filter_map(|r| r["id"].as_i64()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 4, 6, 8, 10, 101, 102, 103]);
    for row in &response.data {
        assert::contains(row["name"].as_str().unwrap(), "Mary");
    }

    let fetch = source.stats().statements.last().unwrap().clone();
    assert::contains(&fetch, r#"UNION ALL (SELECT id, name FROM "staff")) AS "union_table" WHERE"#);
}

#[tokio::test]
async fn distinct_base_counts_distinct_keys() {
    let mut rows = people(5);
    rows.extend(people(3));
    let source = MemorySource::new().with_table("people", rows);
    let params = DtParams::new(1).column("id").column("name");

    let response = DataTable::new(TableQuery::table("people").distinct())
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.records_total, 5);
    assert_eq!(response.records_filtered, 5);
    assert::ids(&data(&response), &[1, 2, 3, 4, 5]);

    let stats = source.stats();
    assert::contains(stats.statements.first().unwrap(), r#"COUNT(DISTINCT "id")"#);
}

// -------------------------------------------------------------------------
// Ordering
// -------------------------------------------------------------------------

#[tokio::test]
async fn default_sort_without_request_order() {
    let source = source(8);
    let params = DtParams::new(1)
        .column_with("id", true, false)
        .column("age");
    let req = request(&params);
    assert!(req.order.is_empty());

    let response = DataTable::new(TableQuery::table("people"))
        .request(req)
        .default_sort("age", SortDirection::Desc)
        .make(&source)
        .await
        .unwrap();

    let ages: Vec<i64> = response.data.iter().map(|r| r["age"].as_i64().unwrap()).collect();
    assert_eq!(ages, vec![50, 50, 40, 40, 30, 30, 20, 20]);
    assert::contains(source.stats().statements.last().unwrap(), r#"ORDER BY "age" DESC"#);
}

#[tokio::test]
async fn request_order_uses_storage_name() {
    let source = source(6);
    let params = DtParams::new(1).column("id").column("years").order(1, "desc").order(0, "asc");

    let response = DataTable::new(TableQuery::table("people"))
        .add_column(Column::new("years").name("age"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    assert::ids(&data(&response), &[4, 3, 2, 6, 1, 5]);
    assert::contains(
        source.stats().statements.last().unwrap(),
        r#"ORDER BY "age" DESC, "id" ASC"#,
    );
}

// -------------------------------------------------------------------------
// Response assembly
// -------------------------------------------------------------------------

#[tokio::test]
async fn decoration_and_projection() {
    let source = source(30);
    let params = DtParams::new(5).page(10, 3).column("id").column("name");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .with_number()
        .edit_column("name", |v| json!(v.as_str().unwrap_or_default().to_uppercase()))
        .add_custom_column(|mut row| {
            let label = format!("#{}", row["no"]);
            row.insert("label".into(), json!(label));
            row
        })
        .row_id(|row| format!("person_{}", row["id"]))
        .only(["id", "name", "no", "label"])
        .with_data("title", "People")
        .make(&source)
        .await
        .unwrap();

    assert_eq!(
        response.data[0],
        json!({
            "id": 11,
            "name": "JOHN SMITH 10",
            "no": 11,
            "label": "#11",
            "DT_RowId": "person_11"
        })
    );
    assert_eq!(response.data[2]["no"], json!(13));

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["draw"], json!(5));
    assert_eq!(body["title"], json!("People"));
    assert::has_key(&body, "recordsFiltered");
}

#[tokio::test]
async fn removed_columns_leave_the_output() {
    let source = source(3);
    let params = DtParams::new(1).column("id").column("name").column("email");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .remove_column(&["email"])
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.data[0], json!({"id": 1, "name": "John Smith 0"}));
}

#[tokio::test]
async fn array_rows_follow_visible_columns() {
    let source = source(2);
    let params = DtParams::new(1).column("name").column("id").column("team");
    let config = gridline::Config {
        response_format: ResponseFormat::Arrays,
        ..gridline::Config::default()
    };

    let response = DataTable::new(TableQuery::table("people"))
        .config(config)
        .request(request(&params))
        .blacklist(["team"])
        .make(&source)
        .await
        .unwrap();

    assert_eq!(data(&response), json!([["John Smith 0", 1], ["Mary Jones 1", 2]]));
}

#[tokio::test]
async fn relations_are_preloaded() {
    let source = source(4);
    let model = Model::new("people").relation(Relation::has_many("posts", "posts", "user_id"));
    let params = DtParams::new(1).page(0, 2).column("id");

    let rows = DataTable::new(TableQuery::model(model))
        .request(request(&params))
        .with(["posts"])
        .raw(&source)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    let titles: Vec<&str> = rows[1]["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Post 0 by 2", "Post 1 by 2"]);
}

#[tokio::test]
async fn case_insensitive_search_folds_both_sides() {
    let source = source(20);
    let params = DtParams::new(1).search("MARY").column("name");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .case_insensitive()
        .make(&source)
        .await
        .unwrap();

    assert_eq!(response.records_filtered, 10);
    assert::contains(
        source.stats().statements.last().unwrap(),
        r#"LOWER(CAST("name" AS TEXT)) LIKE '%mary%'"#,
    );
}

#[tokio::test]
async fn column_search_narrows_results() {
    let source = source(40);
    let params = DtParams::new(1)
        .column("id")
        .column("team")
        .column("name")
        .column_search(1, "blue")
        .column_search(2, "John");

    let response = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap();

    // Blue is every third row starting at index 1, John every even index.
    assert_eq!(response.records_filtered, 6);
}

// -------------------------------------------------------------------------
// Errors
// -------------------------------------------------------------------------

#[tokio::test]
async fn validation_errors_run_nothing() {
    let source = source(5);

    let err = DataTable::new(TableQuery::table("people"))
        .make(&source)
        .await
        .unwrap_err();
    assert!(matches!(err, DataTableError::InvalidRequest));

    let params = DtParams::new(1).regex_search("(unclosed").column("name");
    let err = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap_err();
    assert!(matches!(err, DataTableError::InvalidRegex(_)));
    assert!(!err.is_execution());

    assert!(source.stats().statements.is_empty());
}

#[tokio::test]
async fn count_failure_aborts_before_fetch() {
    let source = source(5);
    source.fail_on(Operation::Count);
    let params = DtParams::new(1).column("id");

    let err = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap_err();

    assert!(err.is_execution());
    assert_eq!(source.stats().fetches, 0);
}

#[tokio::test]
async fn fetch_failure_is_surfaced() {
    let source = source(5);
    source.fail_on(Operation::Fetch);
    let params = DtParams::new(1).column("id");

    let err = DataTable::new(TableQuery::table("people"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap_err();

    assert!(matches!(err, DataTableError::Source(_)));
    assert_eq!(source.stats().counts, 2);
}

#[tokio::test]
async fn unknown_table_is_an_execution_error() {
    let source = source(5);
    let params = DtParams::new(1).column("id");

    let err = DataTable::new(TableQuery::table("missing"))
        .request(request(&params))
        .make(&source)
        .await
        .unwrap_err();

    assert!(err.is_execution());
    assert::contains(&err.to_string(), "missing");
}
