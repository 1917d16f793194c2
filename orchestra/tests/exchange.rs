use std::collections::BTreeMap;

use assert_fs::{prelude::*, TempDir};
use orchestra::{
    config::ExchangeConfig,
    execution::{
        applier::{Update, UpdateKind},
        engine::DatalogEngine,
        exchange::UpdateExchange,
        memory_engine::MemoryEngine,
    },
    io::parser::{load_exchange, parse_exchange},
};
use orchestra_physical::datavalues::DataValue;
use test_log::test;

const EMPLOYEES: &str = r#"
    peer P1 schema S1.
    relation Emp(id: integer, name: string).
    peer P2 schema S2.
    relation EmpCopy(id: integer, name: string).
    mapping m1: EmpCopy(X, Y) :- Emp(X, Y).
"#;

const BIDIRECTIONAL: &str = r#"
    peer P1 schema S1.
    relation Emp(id: integer, name: string).
    peer P2 schema S2.
    relation EmpCopy(id: integer, name: string).
    peer P3 schema S3.
    relation Boss(id: integer, name: string).
    mapping m1 bidirectional: EmpCopy(X, Y) :- Emp(X, Y).
    mapping m2: Boss(X, Y) :- Emp(X, Y).
"#;

const SUPERVISORS: &str = r#"
    peer P1 schema S1.
    relation Emp(id: integer, name: string).
    relation Works(id: integer, dept: string).
    peer P2 schema S2.
    relation Staff(id: integer, name: string, dept: string).
    relation Boss(id: integer, boss: string).
    mapping m1: Staff(X, Y, D) :- Emp(X, Y), Works(X, D).
    mapping m2: Boss(X, Z) :- Staff(X, Y, D).
"#;

const ARCHIVE: &str = r#"
    peer P1 schema S1.
    relation Emp(id: integer, name: string).
    peer P2 schema S2.
    relation EmpCopy(id: integer, name: string).
    peer P3 schema S3.
    relation Archive(id: integer, name: string).
    mapping m1: EmpCopy(X, Y) :- Emp(X, Y).
    mapping m2: Archive(X, Y) :- EmpCopy(X, Y).
"#;

fn employee(id: i64, name: &str) -> Vec<DataValue> {
    vec![DataValue::from(id), DataValue::from(name)]
}

fn setup(text: &str, config: ExchangeConfig) -> (UpdateExchange, MemoryEngine) {
    let file = parse_exchange(text).unwrap();
    let exchange = UpdateExchange::new(file.system, config).unwrap();
    let engine = exchange.create_engine().unwrap();
    (exchange, engine)
}

fn round(exchange: &mut UpdateExchange, engine: &mut MemoryEngine, updates: &[Update]) {
    exchange.stage_updates(engine, updates).unwrap();
    exchange.map_updates(engine).unwrap();
}

fn counts(engine: &MemoryEngine) -> BTreeMap<String, usize> {
    engine
        .table_names()
        .into_iter()
        .map(|name| {
            let count = engine.count(&name).unwrap();
            (name, count)
        })
        .collect()
}

fn insert(relation: &str, tuple: Vec<DataValue>) -> Update {
    Update::new(UpdateKind::Insert, relation, tuple)
}

fn delete(relation: &str, tuple: Vec<DataValue>) -> Update {
    Update::new(UpdateKind::Delete, relation, tuple)
}

fn reject(relation: &str, tuple: Vec<DataValue>) -> Update {
    Update::new(UpdateKind::Reject, relation, tuple)
}

fn unreject(relation: &str, tuple: Vec<DataValue>) -> Update {
    Update::new(UpdateKind::Unreject, relation, tuple)
}

#[test]
fn insertion_reaches_target_peer() {
    let (mut exchange, mut engine) = setup(EMPLOYEES, ExchangeConfig::default());
    round(&mut exchange, &mut engine, &[insert("Emp", employee(1, "Alice"))]);

    assert_eq!(engine.rows("EmpCopy").unwrap(), vec![employee(1, "Alice")]);
    assert_eq!(engine.rows("Emp_L").unwrap(), vec![employee(1, "Alice")]);
    for table in ["Emp_INS", "EmpCopy_INS", "Emp_L_INS", "P_m1_INS", "Emp_NEW"] {
        assert_eq!(engine.count(table).unwrap(), 0, "{table} is not empty");
    }
}

#[test]
fn empty_delta_changes_nothing() {
    for incremental in [true, false] {
        let config = ExchangeConfig {
            incremental,
            ..Default::default()
        };
        let (mut exchange, mut engine) = setup(SUPERVISORS, config);
        round(
            &mut exchange,
            &mut engine,
            &[
                insert("Emp", employee(1, "Alice")),
                insert("Works", employee(1, "Sales")),
            ],
        );

        let before = counts(&engine);
        exchange.map_updates(&mut engine).unwrap();
        assert_eq!(counts(&engine), before);
    }
}

#[test]
fn deletion_removes_derived_tuples() {
    let (mut exchange, mut engine) = setup(EMPLOYEES, ExchangeConfig::default());
    round(
        &mut exchange,
        &mut engine,
        &[
            insert("Emp", employee(1, "Alice")),
            insert("Emp", employee(2, "Bob")),
        ],
    );
    round(&mut exchange, &mut engine, &[delete("Emp", employee(1, "Alice"))]);

    assert_eq!(engine.rows("Emp").unwrap(), vec![employee(2, "Bob")]);
    assert_eq!(engine.rows("EmpCopy").unwrap(), vec![employee(2, "Bob")]);
    assert_eq!(engine.count("Emp_L_DEL").unwrap(), 0);
    assert_eq!(exchange.statistics().deletion_times.len(), 2);
}

#[test]
fn tuples_with_other_derivations_are_rederived() {
    let (mut exchange, mut engine) = setup(EMPLOYEES, ExchangeConfig::default());
    round(
        &mut exchange,
        &mut engine,
        &[
            insert("Emp", employee(1, "Alice")),
            insert("EmpCopy", employee(1, "Alice")),
        ],
    );
    round(&mut exchange, &mut engine, &[delete("Emp", employee(1, "Alice"))]);

    assert!(engine.rows("Emp").unwrap().is_empty());
    assert_eq!(engine.rows("EmpCopy").unwrap(), vec![employee(1, "Alice")]);
}

#[test]
fn rejected_tuples_are_not_imported() {
    let (mut exchange, mut engine) = setup(EMPLOYEES, ExchangeConfig::default());
    round(
        &mut exchange,
        &mut engine,
        &[reject("EmpCopy", employee(1, "Alice"))],
    );
    round(
        &mut exchange,
        &mut engine,
        &[
            insert("Emp", employee(1, "Alice")),
            insert("Emp", employee(2, "Bob")),
        ],
    );

    assert_eq!(engine.rows("EmpCopy").unwrap(), vec![employee(2, "Bob")]);
    assert_eq!(engine.rows("EmpCopy_R").unwrap(), vec![employee(1, "Alice")]);
}

#[test]
fn rejecting_imported_tuples_removes_them() {
    let batches = [
        vec![
            insert("Emp", employee(1, "Alice")),
            insert("Emp", employee(2, "Bob")),
            insert("EmpCopy", employee(2, "Bob")),
        ],
        vec![
            reject("EmpCopy", employee(1, "Alice")),
            reject("EmpCopy", employee(2, "Bob")),
            insert("Emp", employee(3, "Carol")),
            reject("EmpCopy", employee(3, "Carol")),
        ],
        vec![
            unreject("EmpCopy", employee(1, "Alice")),
            unreject("EmpCopy", employee(3, "Carol")),
        ],
    ];

    let mut results = Vec::new();
    for incremental in [true, false] {
        let config = ExchangeConfig {
            incremental,
            ..Default::default()
        };
        let (mut exchange, mut engine) = setup(ARCHIVE, config);

        let mut rounds = Vec::new();
        for batch in &batches {
            round(&mut exchange, &mut engine, batch);
            rounds.push(
                ["Emp", "EmpCopy", "EmpCopy_R", "Archive", "P_m1", "P_m2"]
                    .map(|relation| engine.rows(relation).unwrap())
                    .to_vec(),
            );

            for table in ["EmpCopy_R_INS", "EmpCopy_R_DEL", "EmpCopy_DEL", "Archive_DEL"] {
                assert_eq!(engine.count(table).unwrap(), 0, "{table} is not empty");
            }
        }
        results.push(rounds);
    }

    assert_eq!(results[0], results[1]);

    // local contributions are kept, imports of rejected tuples are not
    let rejected = &results[0][1];
    assert_eq!(rejected[1], vec![employee(2, "Bob")]);
    assert_eq!(
        rejected[2],
        vec![employee(1, "Alice"), employee(2, "Bob"), employee(3, "Carol")]
    );
    assert_eq!(rejected[3], vec![employee(2, "Bob")]);

    let withdrawn = &results[0][2];
    let everyone = vec![employee(1, "Alice"), employee(2, "Bob"), employee(3, "Carol")];
    assert_eq!(withdrawn[1], everyone);
    assert_eq!(withdrawn[2], vec![employee(2, "Bob")]);
    assert_eq!(withdrawn[3], everyone);
}

#[test]
fn existential_variables_get_labeled_nulls() {
    let (mut exchange, mut engine) = setup(SUPERVISORS, ExchangeConfig::default());
    round(
        &mut exchange,
        &mut engine,
        &[
            insert("Emp", employee(1, "Alice")),
            insert("Works", employee(1, "Sales")),
            insert("Works", employee(1, "Support")),
        ],
    );

    assert_eq!(engine.count("Staff").unwrap(), 2);
    assert_eq!(
        engine.rows("Boss").unwrap(),
        vec![vec![
            DataValue::from(1i64),
            DataValue::skolem("SK_m2_Z", vec![DataValue::from(1i64)])
        ]]
    );
}

#[test]
fn incremental_and_full_recomputation_agree() {
    let batches = [
        vec![
            insert("Emp", employee(1, "Alice")),
            insert("Emp", employee(2, "Bob")),
            insert("Works", employee(1, "Sales")),
            insert("Works", employee(2, "Sales")),
        ],
        vec![
            delete("Emp", employee(1, "Alice")),
            insert("Works", employee(2, "Support")),
        ],
        vec![
            delete("Works", employee(2, "Sales")),
            insert("Emp", employee(3, "Carol")),
            insert("Works", employee(3, "Sales")),
        ],
    ];

    let mut results = Vec::new();
    for incremental in [true, false] {
        let config = ExchangeConfig {
            incremental,
            ..Default::default()
        };
        let (mut exchange, mut engine) = setup(SUPERVISORS, config);
        for batch in &batches {
            round(&mut exchange, &mut engine, batch);
        }

        results.push(
            ["Emp", "Works", "Staff", "Boss"]
                .map(|relation| engine.rows(relation).unwrap())
                .to_vec(),
        );
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0][2].len(), 2);
}

#[test]
fn bidirectional_deletion_with_side_effects() {
    let (mut exchange, mut engine) = setup(BIDIRECTIONAL, ExchangeConfig::default());
    round(
        &mut exchange,
        &mut engine,
        &[
            insert("Emp", employee(1, "Alice")),
            insert("EmpCopy", employee(1, "Alice")),
        ],
    );
    assert_eq!(engine.count("Boss").unwrap(), 1);

    round(&mut exchange, &mut engine, &[delete("EmpCopy", employee(1, "Alice"))]);

    for relation in ["Emp", "Emp_L", "EmpCopy", "EmpCopy_L", "Boss"] {
        assert_eq!(engine.count(relation).unwrap(), 0, "{relation} is not empty");
    }
}

#[test]
fn bidirectional_deletion_without_side_effects() {
    let config = ExchangeConfig {
        allow_side_effects: false,
        ..Default::default()
    };
    let (mut exchange, mut engine) = setup(BIDIRECTIONAL, config);
    round(
        &mut exchange,
        &mut engine,
        &[
            insert("Emp", employee(1, "Alice")),
            insert("EmpCopy", employee(1, "Alice")),
        ],
    );

    round(&mut exchange, &mut engine, &[delete("EmpCopy", employee(1, "Alice"))]);

    // deleting Emp(1, "Alice") would also delete Boss(1, "Alice")
    assert_eq!(engine.rows("Emp_L").unwrap(), vec![employee(1, "Alice")]);
    assert_eq!(engine.rows("Boss").unwrap(), vec![employee(1, "Alice")]);
    assert_eq!(engine.rows("EmpCopy").unwrap(), vec![employee(1, "Alice")]);
    assert!(engine.rows("EmpCopy_L").unwrap().is_empty());
    for table in ["Emp_D", "Boss_INV", "Emp_RCH"] {
        assert_eq!(engine.count(table).unwrap(), 0, "{table} is not empty");
    }
}

#[test]
fn journal_records_phases() {
    let (mut exchange, mut engine) = setup(EMPLOYEES, ExchangeConfig::default());
    round(&mut exchange, &mut engine, &[insert("Emp", employee(1, "Alice"))]);

    assert!(engine
        .journal()
        .iter()
        .any(|entry| entry.starts_with("mapping insertions completed")));
    assert!(engine.timing().get("programs/mapping insertions").is_some());
}

#[test]
fn exchange_and_configuration_files() {
    let directory = TempDir::new().unwrap();
    let exchange_file = directory.child("employees.orc");
    exchange_file
        .write_str(&format!("{EMPLOYEES}\ninsert Emp(1, \"Alice\").\n"))
        .unwrap();
    let config_file = directory.child("config.json");
    config_file.write_str(r#"{ "incremental": false }"#).unwrap();

    let file = load_exchange(exchange_file.path()).unwrap();
    let config = ExchangeConfig::from_file(config_file.path()).unwrap();
    assert!(!config.incremental);
    assert_eq!(file.updates, vec![insert("Emp", employee(1, "Alice"))]);

    let mut exchange = UpdateExchange::new(file.system, config).unwrap();
    let mut engine = exchange.create_engine().unwrap();
    round(&mut exchange, &mut engine, &file.updates);

    assert_eq!(engine.rows("EmpCopy").unwrap(), vec![employee(1, "Alice")]);
    assert_eq!(exchange.statistics().program_times.len(), 1);

    assert!(load_exchange(&directory.path().join("missing.orc")).is_err());
    directory.close().unwrap();
}
