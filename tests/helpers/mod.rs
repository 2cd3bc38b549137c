//! Shared fixture: five users, three of them in the US
#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use usersearch::contacts::{ContactRecord, MemoryContactLog};
use usersearch::geo::{LatLon, StaticGeocoder};
use usersearch::store::{ActionRecord, OpenRecord, OrderRecord, UserField, COMPLETED};
use usersearch::{
    AssembledQuery, CompilerConfig, FilterCatalog, MemoryUserStore, QueryCompiler, QueryParams,
    UserRecord,
};

pub fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn order(id: i64, cents: i64, status: &str, at: &str) -> OrderRecord {
    OrderRecord {
        id,
        total: Decimal::new(cents, 2),
        status: status.to_string(),
        created_at: dt(at),
    }
}

fn open(id: i64, at: &str) -> OpenRecord {
    OpenRecord {
        id,
        created_at: dt(at),
    }
}

fn action(id: i64, page_id: i64, tags: &[i64], at: &str) -> ActionRecord {
    ActionRecord {
        id,
        page_id,
        page_tag_ids: tags.to_vec(),
        created_at: dt(at),
    }
}

fn field(name: &str, value: &str) -> UserField {
    UserField {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Completed order totals: 1 => 110, 2 => 40, 3 => 150, 4 => 0, 5 => 100.
/// User 3 is unsubscribed.
pub fn users() -> Vec<UserRecord> {
    let mut alice = UserRecord::new(1, "Alice", "Adams", "alice@example.org");
    alice.country = "US".to_string();
    alice.state = "NY".to_string();
    alice.city = "New York".to_string();
    alice.zip = "10001".to_string();
    alice.source = "website".to_string();
    alice.lang_id = Some(1);
    alice.created_at = dt("2019-01-01 00:00:00");
    alice.location = Some(LatLon::new(40.0, -74.0));
    alice.phones = vec!["2125550101".to_string()];
    alice.fields = vec![field("campus", "north"), field("volunteer", "yes")];
    alice.actions = vec![
        action(11, 100, &[7], "2020-02-01 00:00:00"),
        action(12, 101, &[8], "2021-02-01 00:00:00"),
        action(13, 100, &[7], "2022-02-01 00:00:00"),
    ];
    alice.opens = vec![
        open(21, "2020-01-01 00:00:00"),
        open(22, "2021-01-01 00:00:00"),
        open(23, "2022-01-01 00:00:00"),
    ];
    alice.orders = vec![
        order(31, 6000, COMPLETED, "2019-06-01 00:00:00"),
        order(32, 5000, COMPLETED, "2021-06-01 00:00:00"),
    ];

    let mut bob = UserRecord::new(2, "Bob", "Brown", "bob@example.com");
    bob.country = "US".to_string();
    bob.state = "CA".to_string();
    bob.city = "San Francisco".to_string();
    bob.zip = "94110".to_string();
    bob.source = "event".to_string();
    bob.lang_id = Some(2);
    bob.created_at = dt("2020-06-01 00:00:00");
    bob.location = Some(LatLon::new(37.75, -122.41));
    bob.fields = vec![field("campus", "south")];
    bob.actions = vec![action(14, 101, &[8], "2021-03-01 00:00:00")];
    bob.opens = vec![open(24, "2021-05-01 00:00:00")];
    bob.orders = vec![
        order(33, 4000, COMPLETED, "2021-01-01 00:00:00"),
        order(34, 50000, "failed", "2021-02-01 00:00:00"),
    ];

    let mut carol = UserRecord::new(3, "Carol", "Chen", "carol@example.org");
    carol.country = "US".to_string();
    carol.state = "NY".to_string();
    carol.city = "Brooklyn".to_string();
    carol.zip = "10002".to_string();
    carol.source = "website".to_string();
    carol.subscription_status = "unsubscribed".to_string();
    carol.created_at = dt("2021-03-01 00:00:00");
    carol.location = Some(LatLon::new(40.05, -74.02));
    carol.orders = vec![order(35, 15000, COMPLETED, "2022-01-01 00:00:00")];

    let mut dan = UserRecord::new(4, "Dan", "Dubois", "dan@example.ca");
    dan.country = "CA".to_string();
    dan.region = "QC".to_string();
    dan.city = "Montreal".to_string();
    dan.zip = "H2X".to_string();
    dan.source = "event".to_string();
    dan.lang_id = Some(2);
    dan.created_at = dt("2018-01-01 00:00:00");
    dan.phones = vec!["5145550199".to_string()];

    let mut eve = UserRecord::new(5, "Eve", "Evans", "eve@example.mx");
    eve.country = "MX".to_string();
    eve.city = "Monterrey".to_string();
    eve.source = "website".to_string();
    eve.created_at = dt("2022-01-01 00:00:00");
    eve.fields = vec![field("volunteer", "no")];
    eve.orders = vec![order(36, 10000, COMPLETED, "2022-03-01 00:00:00")];

    vec![alice, bob, carol, dan, eve]
}

pub fn store() -> MemoryUserStore {
    MemoryUserStore::new(users())
}

pub fn contacts() -> MemoryContactLog {
    MemoryContactLog::new(vec![
        ContactRecord {
            akid: 2,
            completed_at: dt("2021-05-01 12:00:00"),
            contacted_by: "organizer_a".to_string(),
        },
        ContactRecord {
            akid: 4,
            completed_at: dt("2021-07-01 12:00:00"),
            contacted_by: "organizer_b".to_string(),
        },
    ])
}

pub fn geocoder() -> StaticGeocoder {
    StaticGeocoder::new()
        .with("10001", LatLon::new(40.0, -74.0))
        .with("94110", LatLon::new(37.75, -122.41))
}

pub fn compiler() -> QueryCompiler {
    QueryCompiler::new(
        Arc::new(FilterCatalog::standard()),
        Arc::new(geocoder()),
        Arc::new(contacts()),
    )
}

pub fn compiler_with(config: CompilerConfig) -> QueryCompiler {
    compiler().with_config(config)
}

/// Assemble `querystring` and evaluate it over the fixture
pub async fn select(compiler: &QueryCompiler, querystring: &str) -> (AssembledQuery, Vec<i64>) {
    let assembled = compiler
        .assemble(&QueryParams::parse(querystring))
        .await
        .unwrap();
    let ids = store().matching_ids(&assembled.plan);
    (assembled, ids)
}
