//! Integration tests for mandatory access control.

use labeldb_core::catalog::{ColumnDef, ColumnType, SchemaKind, TableDefinition, TableRef};
use labeldb_core::mac::{grant, store, tables, Compartment, MacError, Marking, Sensitivity};
use labeldb_core::query::{Filter, Insert, Select, StatementExecutor};
use labeldb_core::{Database, DatabaseConfig, DominanceOrder, MacConfig, Value};

struct TestContext {
    db: Database,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self::with_mac(MacConfig::default())
    }

    fn with_mac(mac: MacConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(DatabaseConfig::new(dir.path()).with_mac(mac)).unwrap();
        Self { db, _dir: dir }
    }

    fn count(&self, table: TableRef) -> usize {
        let schemas = self.db.schemas();
        StatementExecutor::new(&schemas)
            .select(&self.db.engine().begin(), &Select::new(table))
            .unwrap()
            .len()
    }

    fn credentials(&self, principal: &str) -> Vec<String> {
        self.db.credentials(principal).unwrap()
    }
}

fn setup_intel(ctx: &TestContext) -> TableRef {
    ctx.db.create_schema("intel", SchemaKind::Restricted).unwrap();
    ctx.db
        .create_table(
            "intel",
            TableDefinition::new("reports")
                .with_column(ColumnDef::new("id", ColumnType::Int64).not_null())
                .with_column(ColumnDef::new("body", ColumnType::Text))
                .with_primary_key(["id"]),
        )
        .unwrap()
}

#[test]
fn test_marking_round_trip() {
    for text in ["SECRET/ALPHA/BETA", "secret/beta/alpha", "TOP SECRET/x", "S//A//B/"] {
        let once = Marking::parse(text).unwrap().render();
        let twice = Marking::parse(&once).unwrap().render();
        assert_eq!(once, twice, "{} did not round trip", text);
    }
    assert_eq!(
        Marking::parse("secret/beta/alpha").unwrap().render(),
        "SECRET/alpha/beta"
    );
}

#[test]
fn test_empty_marking_is_public() {
    let ctx = TestContext::new();
    let marking = ctx
        .db
        .system(|stx| store::resolve_marking(stx, &Marking::parse("")?))
        .unwrap();
    assert_eq!(marking.id(), Some(0));
    assert_eq!(marking.render(), "");
    assert_eq!(ctx.count(tables::marking()), 0);
}

#[test]
fn test_get_or_create_across_transactions() {
    let ctx = TestContext::new();
    let first = ctx
        .db
        .system(|stx| store::resolve_marking(stx, &Marking::parse("SECRET/OPS")?))
        .unwrap();
    let second = ctx
        .db
        .system(|stx| store::resolve_marking(stx, &Marking::parse("secret/OPS")?))
        .unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(ctx.count(tables::sensitivity()), 1);
    assert_eq!(ctx.count(tables::compartment()), 1);
    assert_eq!(ctx.count(tables::marking()), 1);
}

#[test]
fn test_labels_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let db = Database::open(DatabaseConfig::new(dir.path())).unwrap();
        let m = db
            .system(|stx| store::resolve_marking(stx, &Marking::parse("SECRET/OPS")?))
            .unwrap();
        db.flush().unwrap();
        m.id()
    };

    let db = Database::open(DatabaseConfig::new(dir.path())).unwrap();
    let again = db
        .system(|stx| store::resolve_marking(stx, &Marking::parse("SECRET/OPS")?))
        .unwrap();
    assert_eq!(again.id(), id);
}

#[test]
fn test_credentials_form_cross_product() {
    let ctx = TestContext::new();
    ctx.db
        .system(|stx| {
            store::resolve_compartment(stx, &Compartment::new("X"))?;
            store::resolve_sensitivity(stx, &Sensitivity::new("A"))?;
            store::resolve_sensitivity(stx, &Sensitivity::new("B"))?;
            store::resolve_compartment(stx, &Compartment::new("Y"))?;
            store::resolve_compartment(stx, &Compartment::new("Z"))?;
            Ok(())
        })
        .unwrap();
    ctx.db
        .system(|stx| store::resolve_marking(stx, &Marking::parse("C/Y/W")?))
        .unwrap();

    // 3 sensitivities x 4 compartments
    assert_eq!(ctx.count(tables::credential()), 12);
    let pairs = ctx
        .db
        .system(|stx| {
            let mut n = 0;
            for s in store::sensitivities(stx)? {
                for c in store::compartments(stx)? {
                    if store::credential_id(stx, s.id().unwrap(), c.id().unwrap())?.is_some() {
                        n += 1;
                    }
                }
            }
            Ok(n)
        })
        .unwrap();
    assert_eq!(pairs, 12);
}

#[test]
fn test_marking_canonicalisation() {
    let ctx = TestContext::new();
    let a = ctx
        .db
        .system(|stx| store::resolve_marking(stx, &Marking::parse("S/A/B")?))
        .unwrap();
    let b = ctx
        .db
        .system(|stx| store::resolve_marking(stx, &Marking::parse("S/B/A")?))
        .unwrap();
    assert_eq!(a.id(), b.id());
    assert_eq!(a.canonical_key(), b.canonical_key());
    assert_eq!(ctx.count(tables::marking()), 1);
}

#[test]
fn test_grant_arity() {
    let ctx = TestContext::new();
    let admin = ctx.db.open_session("admin");
    for text in ["S/A/B", "", "S"] {
        let result = ctx.db.grant(&admin, text, "alice");
        assert!(
            matches!(result, Err(MacError::InvalidGrant(_)) | Err(MacError::MalformedMarking { .. })),
            "{:?} should be rejected",
            text
        );
    }
    assert_eq!(ctx.count(tables::user_credential()), 0);
    ctx.db.grant(&admin, "S/A", "alice").unwrap();
    assert_eq!(ctx.credentials("alice"), vec!["S/A"]);
}

#[test]
fn test_cascade_direction() {
    let ctx = TestContext::new();
    let admin = ctx.db.open_session("admin");
    ctx.db
        .system(|stx| store::resolve_sensitivity(stx, &Sensitivity::new("BETA")).map(|_| ()))
        .unwrap();

    ctx.db.grant(&admin, "ALPHA/OPS", "alice").unwrap();
    assert_eq!(ctx.credentials("alice"), vec!["ALPHA/OPS"]);

    ctx.db.grant(&admin, "BETA/OPS", "bob").unwrap();
    assert_eq!(ctx.credentials("bob"), vec!["ALPHA/OPS", "BETA/OPS"]);
    assert_eq!(ctx.credentials("alice"), vec!["ALPHA/OPS"]);
}

#[test]
fn test_ranked_cascade() {
    let order = DominanceOrder::ranked(["UNCLASSIFIED", "CONFIDENTIAL", "SECRET"]);
    let ctx = TestContext::with_mac(MacConfig::default().with_dominance(order));
    let admin = ctx.db.open_session("admin");
    ctx.db.grant(&admin, "UNCLASSIFIED/OPS", "carol").unwrap();
    ctx.db.grant(&admin, "SECRET/OPS", "alice").unwrap();

    assert_eq!(
        ctx.credentials("alice"),
        vec!["SECRET/OPS", "UNCLASSIFIED/OPS"]
    );
    assert_eq!(ctx.credentials("carol"), vec!["UNCLASSIFIED/OPS"]);
}

#[test]
fn test_revoke() {
    let ctx = TestContext::new();
    let admin = ctx.db.open_session("admin");
    ctx.db.grant(&admin, "A/OPS", "alice").unwrap();
    ctx.db.grant(&admin, "B/OPS", "alice").unwrap();
    assert_eq!(ctx.credentials("alice"), vec!["A/OPS", "B/OPS"]);

    assert_eq!(ctx.db.revoke(&admin, "B/OPS", "alice").unwrap(), 1);
    assert_eq!(ctx.credentials("alice"), vec!["A/OPS"]);
    assert_eq!(ctx.db.revoke(&admin, "B/OPS", "alice").unwrap(), 0);
}

#[test]
fn test_view_enforces_session_markings() {
    let ctx = TestContext::new();
    let view = setup_intel(&ctx);
    let admin = ctx.db.open_session("admin");
    ctx.db.grant(&admin, "SECRET/OPS", "alice").unwrap();

    let writer = ctx.db.open_session("writer");
    ctx.db
        .insert(
            &writer,
            &Insert::new(view.clone()).value("id", 1i64).value("body", "marked"),
            Some("SECRET/OPS"),
        )
        .unwrap();
    ctx.db
        .insert(
            &writer,
            &Insert::new(view.clone()).value("id", 2i64).value("body", "public"),
            None,
        )
        .unwrap();

    // Only the empty marking is active in a new session
    let mut alice = ctx.db.open_session("alice");
    let rows = ctx.db.select(&alice, &Select::new(view.clone())).unwrap();
    assert_eq!(rows.columns, vec!["ID", "BODY", "MARKING"]);
    assert_eq!(rows.column_values("ID"), vec![&Value::Int64(2)]);

    ctx.db.activate_marking(&mut alice, "SECRET/OPS").unwrap();
    let rows = ctx.db.select(&alice, &Select::new(view.clone())).unwrap();
    assert_eq!(rows.len(), 2);
    let marked = ctx
        .db
        .select(
            &alice,
            &Select::new(view.clone()).filter(Filter::eq("MARKING", "SECRET/OPS")),
        )
        .unwrap();
    assert_eq!(marked.column_values("BODY"), vec![&Value::from("marked")]);

    // Bob holds no credential for the marking
    let mut bob = ctx.db.open_session("bob");
    assert!(matches!(
        ctx.db.activate_marking(&mut bob, "SECRET/OPS"),
        Err(MacError::NotCleared { .. })
    ));
    assert_eq!(ctx.db.select(&bob, &Select::new(view)).unwrap().len(), 1);
}

#[test]
fn test_marking_rejected_for_unrestricted_table() {
    let ctx = TestContext::new();
    ctx.db.create_schema("app", SchemaKind::Regular).unwrap();
    let notes = ctx
        .db
        .create_table(
            "app",
            TableDefinition::new("notes").with_column(ColumnDef::new("body", ColumnType::Text)),
        )
        .unwrap();
    let session = ctx.db.open_session("alice");

    let result = ctx.db.insert(
        &session,
        &Insert::new(notes.clone()).value("body", "x"),
        Some("SECRET/OPS"),
    );
    assert!(matches!(result, Err(MacError::MarkingOnUnrestrictedTable(_))));
    // The marking was not created
    assert_eq!(ctx.count(tables::marking()), 0);

    ctx.db
        .insert(&session, &Insert::new(notes.clone()).value("body", "x"), None)
        .unwrap();
    assert_eq!(ctx.db.select(&session, &Select::new(notes)).unwrap().len(), 1);
}

#[test]
fn test_label_store_is_read_only_to_sessions() {
    let ctx = TestContext::new();
    let session = ctx.db.open_session("mallory");
    let result = ctx.db.insert(
        &session,
        &Insert::new(tables::user_credential())
            .value("user_name", "MALLORY")
            .value("credential_id", 1i64),
        None,
    );
    assert!(matches!(result, Err(MacError::ProtectedObject(_))));
}

#[test]
fn test_malformed_marking_on_insert() {
    let ctx = TestContext::new();
    let view = setup_intel(&ctx);
    let session = ctx.db.open_session("alice");
    let result = ctx.db.insert(
        &session,
        &Insert::new(view).value("id", 1i64),
        Some("SECRET"),
    );
    assert!(matches!(result, Err(MacError::MalformedMarking { .. })));
}

#[test]
fn test_concurrent_grants_share_labels() {
    let ctx = TestContext::new();
    std::thread::scope(|scope| {
        for i in 0..4 {
            let db = &ctx.db;
            scope.spawn(move || {
                let admin = db.open_session("admin");
                db.grant(&admin, "SECRET/OPS", &format!("user{}", i)).unwrap();
            });
        }
    });
    assert_eq!(ctx.count(tables::sensitivity()), 1);
    assert_eq!(ctx.count(tables::compartment()), 1);
    assert_eq!(ctx.count(tables::credential()), 1);
    assert_eq!(ctx.count(tables::user_credential()), 4);
    for i in 0..4 {
        let held = ctx.db.system(|stx| grant::credentials(stx, &format!("USER{}", i))).unwrap();
        assert_eq!(held, vec!["SECRET/OPS"]);
    }
}
