//! Integration tests exercising the full pipeline:
//! decode → materialize → append → reconstruct → export, across modules.

use otp_core::codec::delta::{DeltaBlock, Variant, decode_delta, encode_delta};
use otp_core::codec::entity::EntityLiteral;
use otp_core::codec::symbols::MapBlock;
use otp_core::codec::path::{decode_ternary, encode_ternary};
use otp_core::codec::table::{TableBlock, decode_table, encode_table};
use otp_core::{
    Assignment, Attributes, Branch, CodecError, Path, Session, Statement, SymbolRegistry, Ternary,
    Value, decode, encode, export_json, import_json,
};
use proptest::prelude::*;

const WORKLOAD: &[&str] = &[
    "@Map{U=User,S=Status,A=Active,R=Role}",
    "U(John){S:A|R:Admin}; U(Mary){S:Pending|R:Dev}",
    "#T(Host,IP,Port){web|10.0.0.1|443;db|10.0.0.2|5432}",
    "@Srv{Cpu:2,Zone:eu};[Srv|Srv{Cpu:4}|Srv(edge){Zone:us}]",
    "Cfg.Net.Port:80\nCfg.Debug:true",
    "Cfg.Debug ? Log:Verbose : Log:Info",
    "U(John){R:Owner}; [Srv|Srv(batch){Cpu:16}]",
];

fn load(turns: &[&str]) -> Session {
    Session::replay(turns).expect("workload should decode")
}

/// Test 1: the host table decodes into one entity per row.
#[test]
fn table_scenario() {
    let mut session = Session::new();
    let outcome = session.append("#T(Host,IP){A|1.1.1.1;B|2.2.2.2}").unwrap();
    assert_eq!(outcome.entities, vec!["A", "B"]);

    let snap = session.snapshot();
    assert_eq!(snap.entity("A").unwrap().to_string(), "A{IP:1.1.1.1}");
    assert_eq!(snap.entity("B").unwrap().to_string(), "B{IP:2.2.2.2}");
}

/// Test 2: a base followed by a variant list in a later turn.
#[test]
fn delta_scenario() {
    let mut session = Session::new();
    session.append("@Base{Tier:1,Region:eu,Tls:true}").unwrap();
    session.append("[Base|Base{Tier:2}]").unwrap();

    let snap = session.snapshot();
    let first = snap.entity("Base[0]").unwrap();
    let second = snap.entity("Base[1]").unwrap();
    assert_eq!(first.get("Tier"), Some(&Value::Int(1)));
    assert_eq!(second.get("Tier"), Some(&Value::Int(2)));
    for key in ["Region", "Tls"] {
        assert_eq!(first.get(key), second.get(key), "{key} should be inherited");
    }
}

/// Test 3: ternary resolves against the boolean in current state.
#[test]
fn ternary_scenario() {
    let mut session = Session::new();
    session.append("Cfg.Debug:true").unwrap();
    let outcome = session.append("Cfg.Debug ? Log:Verbose : Log:Info").unwrap();

    assert_eq!(outcome.resolutions[0].branch, "Log:Verbose");
    assert_eq!(session.resolve("Log").unwrap(), Value::text("Verbose"));
}

/// Test 4: appending the same message twice matches appending it once.
#[test]
fn reappend_is_idempotent() {
    for (i, turn) in WORKLOAD.iter().enumerate() {
        let mut prefix = WORKLOAD[..=i].to_vec();
        let once = load(&prefix);
        prefix.push(*turn);
        let twice = load(&prefix);
        assert_eq!(once.snapshot(), twice.snapshot(), "turn {turn}");
    }
}

/// Test 5: a row with the wrong arity is rejected and nothing moves.
#[test]
fn arity_rejection_leaves_store_unchanged() {
    let mut session = load(WORKLOAD);
    let before = session.snapshot().clone();
    let turns = session.turns();

    let err = session
        .append("U(Zed){R:Ops}; #T(Host,IP){x|1;y}")
        .unwrap_err();
    assert!(matches!(err, CodecError::ArityMismatch { row: 1, .. }));
    assert_eq!(session.snapshot(), &before);
    assert_eq!(session.turns(), turns);
    assert!(session.snapshot().entity("Zed").is_none());
}

/// Test 6: an alias cannot be rebound within a session.
#[test]
fn alias_uniqueness() {
    let mut session = load(WORKLOAD);
    let err = session.append("@Map{U=Unit}").unwrap_err();
    assert_eq!(
        err,
        CodecError::DuplicateAlias {
            alias: "U".into(),
            existing: "User".into(),
            attempted: "Unit".into(),
        }
    );
    // Same binding again is fine.
    session.append("@Map{U=User}").unwrap();
}

/// Test 7: decoding the export in a fresh session yields the same state.
#[test]
fn export_replays_to_same_snapshot() {
    let session = load(WORKLOAD);
    let exported = session.export_state().unwrap();
    assert_eq!(exported.lines().count(), WORKLOAD.len());

    let replayed = Session::replay(exported.lines()).unwrap();
    assert_eq!(replayed.snapshot(), session.snapshot());
    assert_eq!(replayed.export_state().unwrap(), exported);
}

/// Test 8: every prefix reconstructs to the state after that turn.
#[test]
fn reconstruct_matches_prefix_replay() {
    let session = load(WORKLOAD);
    for i in 0..WORKLOAD.len() {
        let expected = load(&WORKLOAD[..=i]);
        assert_eq!(&session.reconstruct(i).unwrap(), expected.snapshot());
    }
    assert!(matches!(
        session.reconstruct(WORKLOAD.len()),
        Err(CodecError::UnknownTurn { .. })
    ));
}

/// Test 9: later registry changes never alter materialized entities.
#[test]
fn materialized_variants_survive_realiasing() {
    let mut session = Session::new();
    session.append("@Map{Z=Zone}; @Srv{Z:eu};[Srv|Srv]").unwrap();
    let before = session.snapshot().entity("Srv[1]").cloned();
    session.append("@Map{Zn=Zone}").unwrap();
    assert_eq!(session.snapshot().entity("Srv[1]").cloned(), before);
    assert_eq!(session.registry().alias_of("Zone"), Some("Zn"));
}

/// Test 10: JSON export survives a round trip through import.
#[test]
fn json_roundtrip_with_workload() {
    let session = load(WORKLOAD);
    let json = export_json(&session, "workload", "gemini-2.5-pro").unwrap();
    let restored = import_json(&json).unwrap();
    assert_eq!(restored.snapshot(), session.snapshot());
}

/// Test 11: isolated sessions share nothing and can run on separate threads.
#[test]
fn sessions_are_isolated_across_threads() {
    let handles: Vec<_> = ["@Map{U=User}; U(a){x:1}", "@Map{U=Unit}; U(a){x:2}"]
        .into_iter()
        .map(|turn| std::thread::spawn(move || load(&[turn])))
        .collect();
    let sessions: Vec<Session> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        sessions[0].snapshot().entity("a").unwrap().kind.as_deref(),
        Some("User")
    );
    assert_eq!(
        sessions[1].snapshot().entity("a").unwrap().kind.as_deref(),
        Some("Unit")
    );
}

/// Test 12: model replies wrapped in a code fence still decode.
#[test]
fn fenced_reply_decodes() {
    let mut session = Session::new();
    session
        .append("```otp\n@Map{H=Host}\n#T(H,IP){a|1.1.1.1}\n```")
        .unwrap();
    assert!(session.snapshot().entity("a").is_some());
}

// --- Round-trip properties ---

fn name() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{0,6}"
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-z][a-z0-9.]{0,8}".prop_map(Value::Text),
        "[a-z :,|0-9]{0,10}".prop_map(Value::Text),
        name().prop_map(Value::Ref),
    ]
}

fn attributes() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map(name(), value(), 0..4)
}

fn path() -> impl Strategy<Value = Path> {
    prop::collection::vec(name(), 1..4).prop_map(|s| Path::new(s).unwrap())
}

fn branch() -> impl Strategy<Value = Branch> {
    prop_oneof![
        (path(), value()).prop_map(|(path, value)| Branch::Assign(Assignment { path, value })),
        value().prop_map(Branch::Value),
    ]
}

fn table() -> impl Strategy<Value = TableBlock> {
    prop::collection::btree_set(name(), 1..4).prop_flat_map(|columns| {
        let width = columns.len();
        let rows = prop::collection::vec(prop::collection::vec(value(), width), 0..4);
        (Just(columns.into_iter().collect::<Vec<_>>()), rows)
            .prop_map(|(columns, rows)| TableBlock::new(columns, rows).unwrap())
    })
}

fn delta() -> impl Strategy<Value = DeltaBlock> {
    let variant = (prop::option::of(name()), attributes())
        .prop_map(|(name, overrides)| Variant { name, overrides });
    (
        name(),
        prop::option::of(attributes()),
        prop::collection::vec(variant, 0..4),
    )
        .prop_filter("a bare list needs variants", |(_, base, variants)| {
            base.is_some() || !variants.is_empty()
        })
        .prop_map(|(base, base_attributes, variants)| DeltaBlock {
            base,
            base_attributes,
            variants,
        })
}

fn entity_literal() -> impl Strategy<Value = EntityLiteral> {
    (prop::option::of(name()), name(), attributes()).prop_map(|(kind, name, attributes)| {
        EntityLiteral {
            kind,
            name,
            attributes,
        }
    })
}

fn assignment() -> impl Strategy<Value = Assignment> {
    (path(), value()).prop_map(|(path, value)| Assignment { path, value })
}

/// Each alias always names `<alias>Full`, so redefinitions never conflict.
fn full_name(alias: &str) -> String {
    format!("{alias}Full")
}

fn map_block() -> impl Strategy<Value = MapBlock> {
    prop::collection::btree_set(name(), 1..3).prop_map(|aliases| MapBlock {
        entries: aliases
            .into_iter()
            .map(|alias| {
                let canonical = full_name(&alias);
                (alias, canonical)
            })
            .collect(),
    })
}

fn registry_with(aliases: &[String]) -> SymbolRegistry {
    let mut reg = SymbolRegistry::new();
    for alias in aliases {
        reg.define(alias, &full_name(alias)).unwrap();
    }
    reg
}

proptest! {
    #[test]
    fn table_roundtrip(table in table()) {
        let reg = SymbolRegistry::new();
        let text = encode_table(&table, &reg);
        prop_assert_eq!(decode_table(&text, &reg).unwrap(), table);
    }

    #[test]
    fn delta_roundtrip(block in delta()) {
        let reg = SymbolRegistry::new();
        let text = encode_delta(&block, &reg);
        prop_assert_eq!(decode_delta(&text, &reg).unwrap(), block);
    }

    #[test]
    fn ternary_roundtrip(condition in path(), then in branch(), otherwise in branch()) {
        let reg = SymbolRegistry::new();
        let ternary = Ternary { condition, then, otherwise };
        let text = encode_ternary(&ternary, &reg);
        prop_assert_eq!(decode_ternary(&text, &reg).unwrap(), ternary);
    }

    #[test]
    fn roundtrip_under_aliases(table in table(), aliases in prop::collection::vec(name(), 0..3)) {
        // Names that collide with aliases must come back unexpanded.
        let mut reg = SymbolRegistry::new();
        for alias in &aliases {
            let _ = reg.define(alias, &format!("{alias}Full"));
        }
        let statements = vec![otp_core::Statement::Table(table)];
        let text = encode(&statements, &mut reg.clone()).unwrap();
        prop_assert_eq!(decode(&text, &mut reg).unwrap(), statements);
    }

    #[test]
    fn entity_and_assignment_roundtrip_under_aliases(
        entity in entity_literal(),
        assign in assignment(),
        aliases in prop::collection::vec(name(), 0..4),
    ) {
        let mut reg = registry_with(&aliases);
        let statements = vec![Statement::Entity(entity), Statement::Assign(assign)];
        let text = encode(&statements, &mut reg.clone()).unwrap();
        prop_assert_eq!(decode(&text, &mut reg).unwrap(), statements);
    }

    #[test]
    fn map_then_forms_roundtrip(
        earlier in prop::collection::vec(name(), 0..3),
        map in map_block(),
        entity in entity_literal(),
        assign in assignment(),
    ) {
        // Names bound by the map mid-message must be quoted after it.
        let mut reg = registry_with(&earlier);
        let statements = vec![
            Statement::Map(map.clone()),
            Statement::Entity(entity),
            Statement::Assign(assign),
        ];
        let mut encoder = reg.clone();
        let text = encode(&statements, &mut encoder).unwrap();
        prop_assert_eq!(decode(&text, &mut reg).unwrap(), statements);
        for (alias, canonical) in &map.entries {
            prop_assert_eq!(reg.resolve(alias).unwrap(), canonical.as_str());
        }
        prop_assert_eq!(reg.symbols(), encoder.symbols());
    }
}

#[test]
fn map_bound_name_is_quoted_in_later_statements() {
    let mut reg = SymbolRegistry::new();
    let statements = vec![
        Statement::Map(MapBlock {
            entries: vec![("Ab".into(), "AbFull".into())],
        }),
        Statement::Entity(EntityLiteral {
            kind: Some("Ab".into()),
            name: "Ab".into(),
            attributes: [("Ab".to_string(), Value::Ref("Ab".into()))].into(),
        }),
        Statement::Assign(Assignment {
            path: Path::new(vec!["Ab".into(), "Cd".into()]).unwrap(),
            value: Value::text("Ab"),
        }),
    ];
    let text = encode(&statements, &mut reg.clone()).unwrap();
    assert_eq!(
        text,
        r#"@Map{Ab=AbFull}; "Ab"("Ab"){"Ab":&"Ab"}; "Ab".Cd:"Ab""#
    );
    assert_eq!(decode(&text, &mut reg).unwrap(), statements);
}
