mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::{seed_rows, write_log};
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut rows = seed_rows();
    rows.extend([
        "cart,b1,a,,7,,2026-01-01T09:00:00Z",
        "cart,b1,b,,3,,2026-01-01T09:01:00Z",
        "checkout,b1,,20,,,2026-01-01T09:05:00Z",
        "ship,v1,1,,,TRK-1,2026-01-02T09:00:00Z",
        "reject,v2,2,,,out of stock,2026-01-02T10:00:00Z",
    ]);
    let log = write_log(&rows)?;

    let mut cmd = Command::new(cargo_bin!("rentmesh"));
    cmd.arg(log.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "order,vendor,buyer,status,duration,price,shipping,fine,settlement,captured,buyer_order",
        ))
        .stdout(predicate::str::contains("1,v1,b1,SENT,7,50,10,,PARTIAL_CAPTURE,60,"))
        .stdout(predicate::str::contains("2,v2,b1,REJECTED,3,30,10,,PARTIAL_CAPTURE,60,"));

    Ok(())
}

#[test]
fn test_cli_overdue_return_charges_fine() -> Result<(), Box<dyn std::error::Error>> {
    let mut rows = seed_rows();
    rows.extend([
        "cart,b1,a,,7,,2026-01-01T09:00:00Z",
        "checkout,b1,,10,,,2026-01-01T09:05:00Z",
        "ship,v1,1,,,TRK-1,2026-01-02T09:00:00Z",
        "receive,b1,1,,,,2026-01-03T09:00:00Z",
        "sweep,,,,,,2026-01-13T09:00:00Z",
        "send_back,b1,1,,,RET-1,2026-01-13T10:00:00Z",
        "return,v1,1,,,,2026-01-15T09:00:00Z",
    ]);
    let log = write_log(&rows)?;

    let mut cmd = Command::new(cargo_bin!("rentmesh"));
    cmd.arg(log.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,v1,b1,RETURNED,7,50,10,30,CAPTURED,60,"));

    Ok(())
}

#[test]
fn test_cli_reports_bad_rows_and_keeps_going() -> Result<(), Box<dyn std::error::Error>> {
    let mut rows = seed_rows();
    rows.extend([
        "teleport,b1,a,,,,",
        "cart,b1,a,,,,",
        "cart,b1,a,,3,,",
        // b1 has no rental history, so two weeks is refused.
        "cart,b1,b,,14,,",
        "checkout,b1,,0,,,",
        "ship,v2,1,,,TRK-1,",
    ]);
    let log = write_log(&rows)?;

    let mut cmd = Command::new(cargo_bin!("rentmesh"));
    cmd.arg(log.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading action"))
        .stderr(predicate::str::contains("Error processing action"))
        .stdout(predicate::str::contains("1,v1,b1,NEW_ORDER,3,50,0,,,,"));

    Ok(())
}

#[test]
fn test_cli_missing_input_fails() {
    let mut cmd = Command::new(cargo_bin!("rentmesh"));
    cmd.arg("does/not/exist.csv");

    cmd.assert().failure();
}
