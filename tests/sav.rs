use anyhow::Result;

use dzip::result::DzipError;
use dzip::sav::{read_sav, read_sav_bytes, Measure, MissingRange, SavOptions};
use dzip::{Frame, Metadata};

mod common;
use common::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn column<'a>(frame: &'a Frame, name: &str) -> Vec<&'a str> {
    frame
        .column(name)
        .unwrap_or_else(|| panic!("no column {name}"))
        .collect()
}

fn survey(compression: Compression) -> SavBuilder {
    SavBuilder::new()
        .compression(compression)
        .numeric("AGE", Some("Age in years"), F8_0)
        .numeric("SCORE", None, F8_2)
        .string("NAME", 10, Some("Name"))
        .string("CODE", 4, None)
        .value_labels(&["AGE"], vec![(num(1.0), "One"), (num(2.0), "Two")])
        .value_labels(&["CODE"], vec![(text("ab"), "Alpha Beta")])
        .long_string_labels("NAME", 10, &[("alice", "Alice A.")])
        .row(vec![num(1.0), num(2.5), text("alice"), text("ab")])
        .row(vec![num(2.0), num(SYSMIS), text("bob"), text("cd")])
        .row(vec![num(30.0), num(1e16), text(""), text("ab")])
}

#[test]
fn every_compression_decodes_the_same() -> Result<()> {
    init();
    for compression in [Compression::None, Compression::Bytecode, Compression::Zlib] {
        let bytes = survey(compression).build();
        let (frame, meta) = read_sav_bytes(&bytes, &SavOptions::default())?;

        assert_eq!(frame.columns(), ["AGE", "SCORE", "NAME", "CODE"], "{compression:?}");
        assert_eq!(column(&frame, "AGE"), ["1.0", "2.0", "30.0"]);
        assert_eq!(column(&frame, "SCORE"), ["2.5", "", "1e+16"]);
        assert_eq!(column(&frame, "NAME"), ["alice", "bob", ""]);
        assert_eq!(column(&frame, "CODE"), ["ab", "cd", "ab"]);
        assert_eq!(meta.number_rows, 3);
        assert_eq!(meta.number_columns, 4);
    }
    Ok(())
}

#[test]
fn dictionary_metadata() -> Result<()> {
    init();
    let bytes = survey(Compression::Bytecode).build();
    let (_, meta) = read_sav_bytes(&bytes, &SavOptions::default())?;

    assert_eq!(meta.column_names, ["AGE", "SCORE", "NAME", "CODE"]);
    assert_eq!(meta.column_names_to_labels["AGE"], "Age in years");
    assert_eq!(meta.column_names_to_labels["SCORE"], "");
    assert_eq!(meta.column_names_to_labels["NAME"], "Name");

    let age = &meta.variable_value_labels["AGE"];
    assert_eq!(age.keys().collect::<Vec<_>>(), ["1.0", "2.0"]);
    assert_eq!(age["2.0"], "Two");
    assert_eq!(meta.variable_value_labels["CODE"]["ab"], "Alpha Beta");
    assert_eq!(meta.variable_value_labels["NAME"]["alice"], "Alice A.");
    assert!(!meta.variable_value_labels.contains_key("SCORE"));

    assert_eq!(meta.original_variable_types["AGE"], "F8.0");
    assert_eq!(meta.original_variable_types["SCORE"], "F8.2");
    assert_eq!(meta.original_variable_types["NAME"], "A10");
    assert!(meta.missing_ranges.is_empty());

    // The dzip view of it keeps the four fields.
    let dzip_meta = Metadata::from_config(&meta)?;
    assert_eq!(dzip_meta.shape(), (3, 4));
    assert_eq!(dzip_meta.column_names_to_labels, meta.column_names_to_labels);
    assert_eq!(dzip_meta.variable_value_labels, meta.variable_value_labels);
    Ok(())
}

#[test]
fn long_names_and_very_long_strings() -> Result<()> {
    init();
    let essay = format!("{}{}", "x".repeat(300), "y".repeat(250));
    let bytes = SavBuilder::new()
        .compression(Compression::Bytecode)
        .numeric("Q1", Some("First question"), F8_0)
        .very_long_string("TEXT", 600)
        .long_name("Q1", "question_one")
        .long_name("TEXT", "free_text")
        .long_string_labels("free_text", 600, &[("n/a", "Not answered")])
        .display(&[(3, 8), (1, 50), (1, 50), (1, 50)])
        .row(vec![num(4.0), text(&essay)])
        .row(vec![num(5.0), text("short")])
        .build();
    let (frame, meta) = read_sav_bytes(&bytes, &SavOptions::default())?;

    assert_eq!(frame.columns(), ["question_one", "free_text"]);
    assert_eq!(column(&frame, "free_text"), [essay.as_str(), "short"]);
    assert_eq!(column(&frame, "question_one"), ["4.0", "5.0"]);
    assert_eq!(meta.number_columns, 2);
    assert_eq!(meta.column_names_to_labels["question_one"], "First question");
    assert_eq!(meta.original_variable_types["free_text"], "A600");
    assert_eq!(meta.variable_value_labels["free_text"]["n/a"], "Not answered");

    assert_eq!(meta.variable_measure["question_one"], Measure::Scale);
    assert_eq!(meta.variable_measure["free_text"], Measure::Nominal);
    assert_eq!(meta.variable_display_width["question_one"], 8);
    assert_eq!(meta.variable_display_width["free_text"], 50);
    Ok(())
}

#[test]
fn user_missing_values() -> Result<()> {
    init();
    let bytes = SavBuilder::new()
        .numeric("RESP", None, F8_0)
        .numeric("RANGED", None, F8_0)
        .string("TAG", 8, None)
        .missing("RESP", Missing::Discrete(vec![9.0, 99.0]))
        .missing("RANGED", Missing::Range(90.0, 99.0))
        .missing("TAG", Missing::Strings(vec!["none".to_owned()]))
        .row(vec![num(9.0), num(95.0), text("none")])
        .row(vec![num(1.0), num(5.0), text("some")])
        .build();

    let (frame, meta) = read_sav_bytes(&bytes, &SavOptions::default())?;
    assert_eq!(column(&frame, "RESP"), ["", "1.0"]);
    assert_eq!(column(&frame, "RANGED"), ["", "5.0"]);
    // Only numeric user-missing values are blanked.
    assert_eq!(column(&frame, "TAG"), ["none", "some"]);

    assert_eq!(
        meta.missing_ranges["RESP"],
        [
            MissingRange::Numeric { lo: 9.0, hi: 9.0 },
            MissingRange::Numeric { lo: 99.0, hi: 99.0 }
        ]
    );
    assert_eq!(
        meta.missing_ranges["RANGED"],
        [MissingRange::Numeric { lo: 90.0, hi: 99.0 }]
    );
    assert_eq!(meta.missing_ranges["TAG"], [MissingRange::Text("none".to_owned())]);

    let keep = SavOptions {
        user_missing: true,
        ..Default::default()
    };
    let (frame, _) = read_sav_bytes(&bytes, &keep)?;
    assert_eq!(column(&frame, "RESP"), ["9.0", "1.0"]);
    assert_eq!(column(&frame, "RANGED"), ["95.0", "5.0"]);
    Ok(())
}

#[test]
fn dates_and_times() -> Result<()> {
    init();
    let bytes = SavBuilder::new()
        .compression(Compression::Bytecode)
        .numeric("DAY", None, DATE11)
        .numeric("STAMP", None, DATETIME20)
        .numeric("CLOCK", None, TIME8)
        .row(vec![num(JAN_2_2020), num(JAN_2_2020 + 3723.0), num(3723.0)])
        .row(vec![num(SYSMIS), num(SYSMIS), num(SYSMIS)])
        .build();

    let (frame, _) = read_sav_bytes(&bytes, &SavOptions::default())?;
    assert_eq!(column(&frame, "DAY"), ["2020-01-02", ""]);
    assert_eq!(column(&frame, "STAMP"), ["2020-01-02 01:02:03", ""]);
    assert_eq!(column(&frame, "CLOCK"), ["01:02:03", ""]);

    let raw = SavOptions {
        disable_datetime_conversion: true,
        ..Default::default()
    };
    let (frame, meta) = read_sav_bytes(&bytes, &raw)?;
    assert_eq!(column(&frame, "DAY"), ["13797302400.0", ""]);
    assert_eq!(column(&frame, "CLOCK"), ["3723.0", ""]);
    assert_eq!(meta.original_variable_types["DAY"], "DATE11");
    Ok(())
}

#[test]
fn text_encodings() -> Result<()> {
    init();
    let city = |builder: SavBuilder| {
        builder
            .string("CITY", 8, None)
            .row(vec![text("Zürich")])
            .build()
    };

    let (frame, meta) = read_sav_bytes(&city(SavBuilder::new().encoding("UTF-8")), &Default::default())?;
    assert_eq!(column(&frame, "CITY"), ["Zürich"]);
    assert_eq!(meta.file_encoding, "UTF-8");

    let (frame, _) = read_sav_bytes(&city(SavBuilder::new().character_code(65001)), &Default::default())?;
    assert_eq!(column(&frame, "CITY"), ["Zürich"]);

    // Without either, it's windows-1252.
    let unlabelled = city(SavBuilder::new());
    let (frame, meta) = read_sav_bytes(&unlabelled, &Default::default())?;
    assert_eq!(column(&frame, "CITY"), ["ZÃ¼rich"]);
    assert_eq!(meta.file_encoding, "windows-1252");

    let forced = SavOptions {
        encoding: Some(encoding_rs::UTF_8),
        ..Default::default()
    };
    let (frame, _) = read_sav_bytes(&unlabelled, &forced)?;
    assert_eq!(column(&frame, "CITY"), ["Zürich"]);
    Ok(())
}

fn five_rows() -> SavBuilder {
    (1..=5).fold(
        SavBuilder::new()
            .compression(Compression::Bytecode)
            .numeric("N", None, F8_0),
        |builder, n| builder.row(vec![num(n as f64)]),
    )
}

#[test]
fn row_offset_and_limit() -> Result<()> {
    init();
    let bytes = five_rows().build();
    let window = SavOptions {
        row_offset: 1,
        row_limit: Some(2),
        ..Default::default()
    };
    let (frame, meta) = read_sav_bytes(&bytes, &window)?;
    assert_eq!(column(&frame, "N"), ["2.0", "3.0"]);
    assert_eq!(meta.number_rows, 2);

    let past_the_end = SavOptions {
        row_offset: 10,
        ..Default::default()
    };
    let (frame, _) = read_sav_bytes(&bytes, &past_the_end)?;
    assert!(frame.is_empty());
    assert_eq!(frame.columns(), ["N"]);
    Ok(())
}

#[test]
fn metadata_only() -> Result<()> {
    init();
    let only_meta = SavOptions {
        metadata_only: true,
        ..Default::default()
    };
    let (frame, meta) = read_sav_bytes(&five_rows().build(), &only_meta)?;
    assert!(frame.is_empty());
    assert_eq!(frame.columns(), ["N"]);
    assert_eq!(meta.number_rows, 5);

    // With no count in the header, the cases get counted.
    let unknown = five_rows().declared_cases(-1).build();
    let (_, meta) = read_sav_bytes(&unknown, &only_meta)?;
    assert_eq!(meta.number_rows, 5);
    let (_, meta) = read_sav_bytes(
        &unknown,
        &SavOptions {
            row_offset: 1,
            ..only_meta.clone()
        },
    )?;
    assert_eq!(meta.number_rows, 4);

    let (frame, meta) = read_sav_bytes(&unknown, &Default::default())?;
    assert_eq!(frame.height(), 5);
    assert_eq!(meta.number_rows, 5);
    Ok(())
}

#[test]
fn no_variables_means_no_cases() -> Result<()> {
    init();
    for compression in [Compression::None, Compression::Bytecode, Compression::Zlib] {
        let bytes = SavBuilder::new()
            .compression(compression)
            .declared_cases(-1)
            .build();

        let (frame, meta) = read_sav_bytes(&bytes, &Default::default())?;
        assert!(frame.is_empty());
        assert!(frame.columns().is_empty());
        assert_eq!(meta.number_rows, 0);

        let limited = SavOptions {
            row_limit: Some(3),
            ..Default::default()
        };
        let (frame, _) = read_sav_bytes(&bytes, &limited)?;
        assert_eq!(frame.height(), 0);

        let only_meta = SavOptions {
            metadata_only: true,
            ..Default::default()
        };
        let (_, meta) = read_sav_bytes(&bytes, &only_meta)?;
        assert_eq!(meta.number_rows, 0);
    }
    Ok(())
}

#[test]
fn big_endian_files() -> Result<()> {
    init();
    for compression in [Compression::None, Compression::Bytecode] {
        let little = survey(compression).build();
        let big = survey(compression).big_endian().build();
        assert_ne!(little, big);
        let (little_frame, little_meta) = read_sav_bytes(&little, &Default::default())?;
        let (big_frame, big_meta) = read_sav_bytes(&big, &Default::default())?;
        assert_eq!(little_frame, big_frame);
        assert_eq!(little_meta, big_meta);
    }
    Ok(())
}

#[test]
fn file_level_metadata() -> Result<()> {
    init();
    let bytes = SavBuilder::new()
        .file_label("Survey 2026")
        .document("First line of notes")
        .document("Second")
        .numeric("N", None, F8_0)
        .build();
    let (frame, meta) = read_sav_bytes(&bytes, &Default::default())?;
    assert!(frame.is_empty());
    assert_eq!(meta.file_label, "Survey 2026");
    assert_eq!(meta.notes, ["First line of notes", "Second"]);
    assert_eq!(
        meta.creation_time.map(|t| t.to_string()).as_deref(),
        Some("2026-10-14 12:30:00")
    );
    Ok(())
}

#[test]
fn bad_input() -> Result<()> {
    init();
    assert!(matches!(
        read_sav_bytes(b"not a system file", &Default::default()),
        Err(DzipError::InvalidSav(_))
    ));

    let bytes = survey(Compression::None).build();
    assert!(matches!(
        read_sav_bytes(&bytes[..200], &Default::default()),
        Err(DzipError::InvalidSav(_))
    ));

    let tempdir = tempfile::tempdir()?;
    let missing = tempdir.path().join("missing.sav");
    match read_sav(&missing, &Default::default()) {
        Err(DzipError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("Expected a NotFound, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn reads_from_disk() -> Result<()> {
    init();
    let tempdir = tempfile::tempdir()?;
    let path = tempdir.path().join("survey.zsav");
    std::fs::write(&path, survey(Compression::Zlib).build())?;
    let (frame, meta) = read_sav(&path, &Default::default())?;
    assert_eq!(frame.shape(), (3, 4));
    assert_eq!(meta.number_rows, 3);
    Ok(())
}
