// Integration suite for the aggregation broker; exercises arrival-order
// independence, deduplication, malformed-input isolation, fragment loading
// and the impl-merge binary so regressions surface in one place.
mod support;

use anyhow::{Context, Result};
use implmerge::{
    Contribution, ContributionError, Delivery, ImplementorList, MarkerKey, Page,
    RegistrationError, SourceId, broker_options, contribute_fragment, load_fragment,
    marker_from_path,
};
use serde_json::{Value, json};
use support::{
    broker, contribution, fixture_path, impl_merge, init_logging, run_command, source_ids,
    write_fragment,
};

#[derive(Clone, Copy, Debug)]
enum Step {
    Contribute(&'static str),
    Register,
}

// Every interleaving of two contributions and one registration ends with both
// contributions delivered once, in contribution order.
#[test]
fn delivery_is_independent_of_registration_point() {
    init_logging();
    let orders: [[Step; 3]; 6] = [
        [Step::Register, Step::Contribute("a"), Step::Contribute("b")],
        [Step::Contribute("a"), Step::Register, Step::Contribute("b")],
        [Step::Contribute("a"), Step::Contribute("b"), Step::Register],
        [Step::Register, Step::Contribute("b"), Step::Contribute("a")],
        [Step::Contribute("b"), Step::Register, Step::Contribute("a")],
        [Step::Contribute("b"), Step::Contribute("a"), Step::Register],
    ];

    for steps in orders {
        let mut broker = broker();
        let list = ImplementorList::new();
        let mut expected = Vec::new();
        for step in steps {
            match step {
                Step::Contribute(id) => {
                    let text = format!("impl for {id}");
                    broker.contribute(contribution(id, &[text.as_str()]));
                    expected.push(id.to_string());
                }
                Step::Register => broker.register_consumer(list.clone()).unwrap(),
            }
        }
        assert_eq!(
            source_ids(&list.contributions()),
            expected,
            "interleaving {steps:?}"
        );
        assert!(broker.pending().is_empty(), "interleaving {steps:?}");
    }
}

#[test]
fn duplicate_source_is_observed_once_with_first_content() {
    let mut broker = broker();
    let list = ImplementorList::new();
    assert_eq!(broker.contribute(contribution("a", &["first"])), Delivery::Buffered);
    assert_eq!(
        broker.contribute(contribution("a", &["second", "third"])),
        Delivery::Duplicate
    );
    broker.register_consumer(list.clone()).unwrap();
    assert_eq!(
        broker.contribute(contribution("a", &["fourth"])),
        Delivery::Duplicate
    );

    let delivered = list.contributions();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].records.len(), 1);
    assert_eq!(delivered[0].records[0].display_fragment, "first");
    assert_eq!(broker.stats().duplicates, 2);
}

#[test]
fn buffered_contributions_arrive_in_one_first_batch() {
    let mut broker = broker();
    let list = ImplementorList::new();
    broker.contribute(contribution("a", &["A"]));
    broker.contribute(contribution("b", &["B"]));
    broker.register_consumer(list.clone()).unwrap();
    broker.contribute(contribution("c", &["C"]));

    let batches = list.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(source_ids(&batches[0]), ["a", "b"]);
    assert_eq!(source_ids(&batches[1]), ["c"]);
}

#[test]
fn late_contribution_reaches_registered_consumer() {
    let mut broker = broker();
    let list = ImplementorList::new();
    broker.register_consumer(list.clone()).unwrap();
    assert!(list.is_empty());

    assert_eq!(broker.contribute(contribution("a", &["A"])), Delivery::Delivered);
    assert_eq!(source_ids(&list.contributions()), ["a"]);
}

#[test]
fn first_consumer_stays_active() {
    init_logging();
    let mut broker = broker();
    let first = ImplementorList::new();
    let second = ImplementorList::new();
    broker.contribute(contribution("a", &["A"]));
    broker.register_consumer(first.clone()).unwrap();
    assert_eq!(
        broker.register_consumer(second.clone()),
        Err(RegistrationError::AlreadyRegistered)
    );
    broker.contribute(contribution("b", &["B"]));

    assert_eq!(source_ids(&first.contributions()), ["a", "b"]);
    assert!(second.is_empty());
}

#[test]
fn malformed_contribution_is_isolated() {
    init_logging();
    let mut broker = broker();
    let list = ImplementorList::new();

    let err = broker
        .contribute_object(&json!({"records": [{"text": "impl"}]}))
        .unwrap_err();
    assert!(matches!(err, ContributionError::MissingSourceId));
    assert!(broker.pending().is_empty());

    let err = broker
        .contribute_value("b", &json!({"text": "not a list"}))
        .unwrap_err();
    assert!(matches!(err, ContributionError::Schema { .. }));
    assert!(!broker.has_seen(&SourceId::new("b").unwrap()));

    let delivery = broker
        .contribute_object(&json!({"source_id": "b", "records": [{"text": "impl B"}]}))
        .unwrap();
    assert_eq!(delivery, Delivery::Buffered);
    broker.register_consumer(list.clone()).unwrap();

    assert_eq!(source_ids(&list.contributions()), ["b"]);
    assert_eq!(broker.stats().rejected, 2);
    assert_eq!(broker.stats().accepted, 1);
}

#[test]
fn generator_fragment_fixture_loads() -> Result<()> {
    let path = fixture_path("implementors/core/marker/trait.Unpin.js");
    let payload = load_fragment(&path)?;
    let records = payload
        .get("haybale")
        .and_then(Value::as_array)
        .context("haybale entry present")?;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r["synthetic"] == json!(true)));

    assert_eq!(
        marker_from_path(&path),
        Some(MarkerKey("core::marker::Unpin".to_string()))
    );
    Ok(())
}

#[test]
fn page_merges_fragments_from_disk() -> Result<()> {
    init_logging();
    let other = write_fragment(
        r#"(function() {var implementors = {};
implementors["llvm_ir"] = [{text:"impl Unpin for Module",synthetic:true,types:["llvm_ir::module::Module"]},];
implementors["haybale"] = [{text:"impl Unpin for Impostor",synthetic:false,types:[]},];
})()"#,
    )?;
    let mut page = Page::new(
        MarkerKey("core::marker::Unpin".to_string()),
        broker_options(None)?,
    );
    let list = ImplementorList::new();

    contribute_fragment(&mut page, &fixture_path("implementors/core/marker/trait.Unpin.js"))?;
    page.register_consumer(list.clone())?;
    let report = contribute_fragment(&mut page, other.path())?;

    // haybale already arrived from the fixture; the second copy is dropped.
    let outcomes: Vec<_> = report
        .outcomes
        .iter()
        .map(|(id, delivery)| (id.to_string(), *delivery))
        .collect();
    assert_eq!(
        outcomes,
        [
            ("llvm_ir".to_string(), Delivery::Delivered),
            ("haybale".to_string(), Delivery::Duplicate)
        ]
    );

    let merged: Vec<Contribution> = list.contributions();
    assert_eq!(source_ids(&merged), ["haybale", "llvm_ir"]);
    assert_eq!(merged[0].records.len(), 3);
    assert_eq!(list.records().len(), 4);

    let stats = page.navigate_away().context("page was initialized")?;
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.duplicates, 1);
    Ok(())
}

// The binary's output must not depend on when the consumer registered.
#[test]
fn impl_merge_output_ignores_registration_point() -> Result<()> {
    let extra = write_fragment(
        r#"implementors["llvm_ir"] = [{text:"impl Unpin for Name",synthetic:true,types:["llvm_ir::name::Name"]}];"#,
    )?;
    let fixture = fixture_path("implementors/core/marker/trait.Unpin.js");

    let mut outputs = Vec::new();
    for register_at in ["0", "1", "2"] {
        let mut cmd = impl_merge();
        cmd.arg("--fragment")
            .arg(&fixture)
            .arg("--fragment")
            .arg(extra.path())
            .arg("--fragment")
            .arg(&fixture)
            .arg("--register-at")
            .arg(register_at);
        let output = run_command(cmd)?;
        let value: Value = serde_json::from_slice(&output.stdout)
            .context("impl-merge prints JSON by default")?;
        outputs.push(value);
    }

    for value in &outputs {
        assert_eq!(value["marker"], json!("core::marker::Unpin"));
        let ids: Vec<_> = value["contributions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["source_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["haybale", "llvm_ir"]);
        assert_eq!(value["stats"]["duplicates"], json!(1));
    }
    assert_eq!(outputs[0]["contributions"], outputs[1]["contributions"]);
    assert_eq!(outputs[1]["contributions"], outputs[2]["contributions"]);
    Ok(())
}

#[test]
fn impl_merge_reports_rejected_entries() -> Result<()> {
    let mixed = write_fragment(r#"{"good": [{"text": "impl Good"}], "bad": [{"synthetic": true}]}"#)?;
    let mut cmd = impl_merge();
    cmd.arg("--fragment")
        .arg(mixed.path())
        .arg("--marker")
        .arg("core::marker::Send")
        .arg("--format")
        .arg("text");
    let output = run_command(cmd)?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("implementors of core::marker::Send"), "{stdout}");
    assert!(stdout.contains("sources    : 1"), "{stdout}");
    assert!(stdout.contains("rejected   : 1"), "{stdout}");
    assert!(stdout.contains("'bad'"), "{stdout}");
    // A record without dependency paths still shows its impl line.
    assert!(stdout.contains("    impl Good\n"), "{stdout}");
    Ok(())
}

#[test]
fn impl_merge_fails_on_unreadable_fragment() -> Result<()> {
    let mut cmd = impl_merge();
    cmd.arg("--fragment")
        .arg(fixture_path("implementors/core/marker/trait.Missing.js"))
        .arg("--fragment")
        .arg(fixture_path("implementors/core/marker/trait.Unpin.js"));
    let output = cmd.output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not be loaded"), "{stderr}");

    // The readable fragment still merged.
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["contributions"][0]["source_id"], json!("haybale"));
    Ok(())
}

#[test]
fn impl_merge_rejects_out_of_range_registration() -> Result<()> {
    let mut cmd = impl_merge();
    cmd.arg("--fragment")
        .arg(fixture_path("implementors/core/marker/trait.Unpin.js"))
        .arg("--register-at")
        .arg("5");
    let output = cmd.output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--register-at 5"));
    Ok(())
}
