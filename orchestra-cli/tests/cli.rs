use assert_cmd::prelude::*; // Add methods on commands
use assert_fs::{prelude::*, NamedTempFile};
use predicates::prelude::*;
use std::process::Command; // Run programs
use test_log::test;

const EXCHANGE: &str = r#"
% two peers sharing employees
peer P1 schema S1.
relation Emp(id: integer, name: string).
peer P2 schema S2.
relation EmpCopy(id: integer, name: string).
mapping m1: EmpCopy(X, Y) :- Emp(X, Y).

insert Emp(1, "Alice").
insert Emp(2, "Bob").
delete Emp(2, "Bob").
"#;

fn exchange_file(content: &str) -> Result<NamedTempFile, Box<dyn std::error::Error>> {
    let file = NamedTempFile::new("employees.orc")?;
    file.write_str(content)?;
    Ok(file)
}

#[cfg_attr(miri, ignore)]
#[test]
fn cli_argument_parsing() -> Result<(), Box<dyn std::error::Error>> {
    let bin = "orc";
    let mut cmd = Command::cargo_bin(bin)?;
    cmd.arg("-vvv").arg("Non-existing-file.orc");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No such file or directory"));

    cmd = Command::cargo_bin(bin)?;
    cmd.arg("-h");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Print help"));

    cmd = Command::cargo_bin(bin)?;
    cmd.arg("--version");
    cmd.assert().success().stdout(predicate::str::contains(bin));

    cmd = Command::cargo_bin(bin)?;
    cmd.arg("-v").arg("-q").arg("file.orc");
    cmd.assert().failure().stderr(predicate::str::contains(
        "argument '--verbose...' cannot be used with '--quiet'",
    ));

    cmd = Command::cargo_bin(bin)?;
    cmd.arg("-v").arg("--log").arg("error").arg("file.orc");
    cmd.assert().failure().stderr(predicate::str::contains(
        "argument '--verbose...' cannot be used with '--log <LOG_LEVEL>'",
    ));

    cmd = Command::cargo_bin(bin)?;
    cmd.arg("--log").arg("cats").arg("file.orc");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("'--log <LOG_LEVEL>'"));

    cmd = Command::cargo_bin(bin)?;
    cmd.arg("--xml").arg("sideways").arg("file.orc");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("'--xml <XML>'"));
    Ok(())
}

#[cfg_attr(miri, ignore)]
#[test]
fn reconciliation_round() -> Result<(), Box<dyn std::error::Error>> {
    let file = exchange_file(EXCHANGE)?;

    let mut cmd = Command::cargo_bin("orc")?;
    cmd.arg(file.path()).arg("--print-relations");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("EmpCopy(1, \"Alice\")"))
        .stdout(predicate::str::contains("Bob").not())
        .stdout(predicate::str::contains("Reconciliation completed"));

    file.close()?;
    Ok(())
}

#[cfg_attr(miri, ignore)]
#[test]
fn printing_delta_rules() -> Result<(), Box<dyn std::error::Error>> {
    let file = exchange_file(EXCHANGE)?;

    let mut cmd = Command::cargo_bin("orc")?;
    cmd.arg(file.path()).arg("--print-rules");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Mapping rules:"))
        .stdout(predicate::str::contains("EmpCopy(X, Y) :- P_m1(X, Y)"))
        .stdout(predicate::str::contains("sequence"));

    cmd = Command::cargo_bin("orc")?;
    cmd.arg(file.path()).arg("--xml").arg("deletion");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("<deltaRules"))
        .stdout(predicate::str::contains(r#"type="Deletion""#));
    Ok(())
}

#[cfg_attr(miri, ignore)]
#[test]
fn configuration_file() -> Result<(), Box<dyn std::error::Error>> {
    let file = exchange_file(EXCHANGE)?;
    let config = NamedTempFile::new("config.json")?;
    config.write_str(r#"{ "incremental": false, "journal": false }"#)?;

    let mut cmd = Command::cargo_bin("orc")?;
    cmd.arg(file.path())
        .arg("--config")
        .arg(config.path())
        .arg("--print-relations")
        .arg("--report");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("EmpCopy(1, \"Alice\")"))
        .stdout(predicate::str::contains("orc ["));

    config.write_str(r#"{ "incremental": "sometimes" }"#)?;
    cmd = Command::cargo_bin("orc")?;
    cmd.arg(file.path()).arg("--config").arg(config.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
    Ok(())
}

#[cfg_attr(miri, ignore)]
#[test]
fn malformed_exchange_file() -> Result<(), Box<dyn std::error::Error>> {
    let file = exchange_file("peer P1 schema S1.\nrelation Emp(id: integer.\n")?;

    let mut cmd = Command::cargo_bin("orc")?;
    cmd.arg(file.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unable to load exchange file"))
        .stderr(predicate::str::contains("line 2"));
    Ok(())
}
