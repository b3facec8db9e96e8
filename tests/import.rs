mod common;

use chrono::NaiveDate;
use common::number;
use common::text;
use common::write_file;
use common::xls;
use common::xlsx;
use common::XlsCell;
use rust_decimal::Decimal;
use sheet_import::records_to_json;
use sheet_import::ColumnMapping;
use sheet_import::ConversionError;
use sheet_import::CsvSettings;
use sheet_import::DocumentIssue;
use sheet_import::ImportError;
use sheet_import::ImportSettings;
use sheet_import::Importer;
use sheet_import::JsonMappingElement;
use sheet_import::NoDiagnostics;
use sheet_import::SheetSettings;
use sheet_import::TargetKind;
use sheet_import::Value;
use tempfile::TempDir;

fn csv() -> ImportSettings {
    ImportSettings::Csv(CsvSettings::default())
}

fn sheet(name: &str) -> ImportSettings {
    ImportSettings::Sheet(SheetSettings::new(name))
}

fn product_mappings() -> Vec<ColumnMapping> {
    vec![
        ColumnMapping::new("Product", "name", "Name", TargetKind::String),
        ColumnMapping::new("Product", "quantity", "Quantity", TargetKind::Integer),
        ColumnMapping::new("Product", "price", "Price", TargetKind::Decimal),
        ColumnMapping::new("Product", "active", "Active", TargetKind::Boolean),
    ]
}

#[test]
fn csv_rows_become_records() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(
        &directory,
        "products.csv",
        b"Name,Quantity,Price,Active\nPen,10,123.45,TRUE\n\"Ink, blue\",,0.10,false\nPaper,3,7,True\n",
    );

    let records = Importer::new(&NoDiagnostics).import(&path, &csv(), &product_mappings())?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].kind.as_deref(), Some("Product"));
    assert_eq!(records[0].get("price"), Some(&Value::Decimal(Decimal::new(12345, 2))));
    assert_eq!(records[0].get("active"), Some(&Value::Boolean(true)));
    assert_eq!(records[1].get("name"), Some(&Value::String("Ink, blue".to_owned())));
    assert_eq!(records[1].get("quantity"), None);
    assert_eq!(records[2].get("quantity"), Some(&Value::Integer(3)));
    Ok(())
}

#[test]
fn csv_name_and_age() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(&directory, "people.csv", b"Name,Age\nAlice,30\n");
    let mappings = [
        ColumnMapping::new("Person", "Name", "Name", TargetKind::String),
        ColumnMapping::new("Person", "Age", "Age", TargetKind::Integer),
    ];
    let records = Importer::new(&NoDiagnostics).import(&path, &csv(), &mappings)?;
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].fields,
        [("Name".to_owned(), Value::String("Alice".to_owned())), ("Age".to_owned(), Value::Integer(30))]
    );
    Ok(())
}

#[test]
fn repeated_imports_are_identical() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(&directory, "products.csv", b"Name,Quantity,Price,Active\nPen,10,1.5,true\n");
    let importer = Importer::new(&NoDiagnostics);
    let first = importer.import(&path, &csv(), &product_mappings())?;
    let second = importer.import(&path, &csv(), &product_mappings())?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn csv_with_custom_dialect() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(&directory, "notes.csv", b"Id;Note\n1;'it''s here'\n2;'a;b'\n");
    let settings = ImportSettings::Csv(CsvSettings {
        delimiter: ';',
        quote: Some('\''),
        escape: Some('\''),
        header_is_data: false,
    });
    let mappings = [
        ColumnMapping::new("Note", "id", "Id", TargetKind::Long),
        ColumnMapping::new("Note", "text", "Note", TargetKind::String),
    ];
    let records = Importer::new(&NoDiagnostics).import(&path, &settings, &mappings)?;
    assert_eq!(records[0].get("text"), Some(&Value::String("it's here".to_owned())));
    assert_eq!(records[1].get("text"), Some(&Value::String("a;b".to_owned())));
    assert_eq!(records[1].get("id"), Some(&Value::Long(2)));
    Ok(())
}

#[test]
fn csv_header_mismatch() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(&directory, "products.csv", b"Name,Qty,Price,Active\nPen,10,1.5,true\n");
    let result = Importer::new(&NoDiagnostics).import(&path, &csv(), &product_mappings());
    assert!(matches!(result, Err(ImportError::HeaderMismatch { column }) if column == "Quantity"));
    Ok(())
}

#[test]
fn csv_invalid_value_names_the_row() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(&directory, "products.csv", b"Name,Quantity,Price,Active\nPen,10,1.5,true\nInk,many,2,false\n");
    let result = Importer::new(&NoDiagnostics).import(&path, &csv(), &product_mappings());
    match result {
        Err(ImportError::Conversion { row, column, source: ConversionError::InvalidValue { value, .. } }) => {
            assert_eq!((row, column.as_str(), value.as_str()), (3, "Quantity", "many"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn xlsx_dates_and_numbers() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = directory.path().join("staff.xlsx");
    let rows = [
        format!(r#"<row r="1">{}{}{}</row>"#, text("A1", "Name"), text("B1", "Start"), text("C1", "Grade")),
        format!(r#"<row r="2">{}{}{}</row>"#, text("A2", "Ann"), number("B2", "45321", 1), number("C2", "3", 0)),
    ]
    .concat();
    xlsx(&path, "Staff", &rows, false);

    let mappings = [
        ColumnMapping::new("Employee", "name", "Name", TargetKind::String),
        ColumnMapping::new("Employee", "start", "Start", TargetKind::DateTime),
        ColumnMapping::new("Employee", "start_text", "Start", TargetKind::String),
        ColumnMapping::new("Employee", "grade", "Grade", TargetKind::Long),
    ];
    let records = Importer::new(&NoDiagnostics).import(&path, &sheet("Staff"), &mappings)?;
    assert_eq!(records.len(), 1);
    let start = NaiveDate::from_ymd_opt(2024, 1, 30).and_then(|date| date.and_hms_opt(0, 0, 0));
    assert_eq!(records[0].get("start"), start.map(Value::DateTime).as_ref());
    assert_eq!(records[0].get("start_text"), Some(&Value::String("1/30/24".to_owned())));
    assert_eq!(records[0].get("grade"), Some(&Value::Long(3)));

    let path_1904 = directory.path().join("staff_1904.xlsx");
    xlsx(&path_1904, "Staff", &rows, true);
    let records = Importer::new(&NoDiagnostics).import(&path_1904, &sheet("Staff"), &mappings)?;
    let start = NaiveDate::from_ymd_opt(2028, 1, 31).and_then(|date| date.and_hms_opt(0, 0, 0));
    assert_eq!(records[0].get("start"), start.map(Value::DateTime).as_ref());
    Ok(())
}

#[test]
fn xlsx_header_only_sheet_has_no_records() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = directory.path().join("empty.xlsx");
    xlsx(&path, "Sheet1", &format!(r#"<row r="1">{}</row>"#, text("A1", "Name")), false);
    let mappings = [ColumnMapping::new("Person", "name", "Name", TargetKind::String)];
    let records = Importer::new(&NoDiagnostics).import(&path, &sheet("Sheet1"), &mappings)?;
    assert!(records.is_empty());
    Ok(())
}

#[test]
fn xlsx_error_cells() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = directory.path().join("errors.xlsx");
    let rows = format!(
        r##"<row r="1">{}</row><row r="2"><c r="A2" t="e"><v>#DIV/0!</v></c></row>"##,
        text("A1", "Ratio")
    );
    xlsx(&path, "Sheet1", &rows, false);
    let mappings = [ColumnMapping::new("Stat", "ratio", "Ratio", TargetKind::String)];
    let records = Importer::new(&NoDiagnostics).import(&path, &sheet("Sheet1"), &mappings)?;
    assert_eq!(records[0].get("ratio"), Some(&Value::String("ERROR:#DIV/0!".to_owned())));

    let rows = format!(
        r##"<row r="1">{}</row><row r="2"><c r="A2" t="e"><f>1/0</f><v>#DIV/0!</v></c></row>"##,
        text("A1", "Ratio")
    );
    xlsx(&path, "Sheet1", &rows, false);
    let result = Importer::new(&NoDiagnostics).import(&path, &sheet("Sheet1"), &mappings);
    assert!(matches!(
        result,
        Err(ImportError::InvalidFormulaResult { reference, row: 2, sheet }) if reference == "A2" && sheet == "Sheet1"
    ));
    Ok(())
}

#[test]
fn xlsx_missing_sheet_and_column() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = directory.path().join("people.xlsx");
    xlsx(&path, "People", &format!(r#"<row r="1">{}</row>"#, text("A1", "Name")), false);
    let mappings = [ColumnMapping::new("Person", "age", "Age", TargetKind::Integer)];

    let result = Importer::new(&NoDiagnostics).import(&path, &sheet("Staff"), &mappings);
    assert!(matches!(result, Err(ImportError::SheetNotFound { sheet }) if sheet == "Staff"));

    let result = Importer::new(&NoDiagnostics).import(&path, &sheet("People"), &mappings);
    assert!(matches!(result, Err(ImportError::ColumnNotFound { name, .. }) if name == "Age"));
    Ok(())
}

#[test]
fn xlsx_missing_email_column() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = directory.path().join("contacts.xlsx");
    let rows = format!(r#"<row r="1">{}{}</row>"#, text("A1", "Name"), text("B1", "Phone"));
    xlsx(&path, "Contacts", &rows, false);
    let mappings = [ColumnMapping::new("Contact", "email", "Email", TargetKind::String)];
    let result = Importer::new(&NoDiagnostics).import(&path, &sheet("Contacts"), &mappings);
    assert!(matches!(result, Err(ImportError::ColumnNotFound { name, sheet }) if name == "Email" && sheet == "Contacts"));
    Ok(())
}

#[test]
fn json_mapping_mode() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(&directory, "prices.csv", b"Item , Price\nPen,1.25\n");
    let elements = [
        JsonMappingElement::new("Item", TargetKind::String),
        JsonMappingElement::new("Price", TargetKind::Decimal),
    ];
    let records = Importer::new(&NoDiagnostics).import_json(&path, &csv(), &elements)?;
    assert_eq!(records_to_json(&records).to_string(), r#"[{"Item":"Pen","Price":1.25}]"#);
    Ok(())
}

#[test]
fn rejected_files() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let importer = Importer::new(&NoDiagnostics);

    let path = write_file(&directory, "notes.txt", b"Name\nAnn\n");
    assert!(matches!(importer.import(&path, &csv(), &[]), Err(ImportError::UnsupportedFileType { .. })));

    let path = write_file(&directory, "fake.xlsx", b"just some text");
    assert!(matches!(
        importer.import(&path, &sheet("Sheet1"), &[]),
        Err(ImportError::EncryptedOrCorruptDocument(DocumentIssue::NotOfficeDocument))
    ));

    let path = directory.path().join("missing.csv");
    assert!(matches!(importer.import(&path, &csv(), &[]), Err(ImportError::FileNotFound { .. })));
    Ok(())
}

#[test]
fn csv_invalid_utf8_names_the_row() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = write_file(&directory, "people.csv", b"Name,Age\nAnn,30\nB\xFF\xFEb,41\n");
    let mappings = [ColumnMapping::new("Person", "name", "Name", TargetKind::String)];
    let result = Importer::new(&NoDiagnostics).import(&path, &csv(), &mappings);
    assert!(matches!(result, Err(ImportError::RowParseError { row: 3, .. })));
    Ok(())
}

#[test]
fn xls_rows_become_records() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = directory.path().join("staff.xls");
    let rows = [
        vec![XlsCell::Text("Name"), XlsCell::Text("Start"), XlsCell::Text("Grade")],
        vec![XlsCell::Text("Ann"), XlsCell::Number(45321.0, 1), XlsCell::Number(30.0, 0)],
        vec![XlsCell::Text("Bob"), XlsCell::Number(45322.0, 1), XlsCell::Number(2.5, 0)],
    ];
    xls(&path, "Staff", &rows);

    let mappings = [
        ColumnMapping::new("Employee", "name", "Name", TargetKind::String),
        ColumnMapping::new("Employee", "start", "Start", TargetKind::DateTime),
        ColumnMapping::new("Employee", "start_text", "Start", TargetKind::String),
        ColumnMapping::new("Employee", "grade", "Grade", TargetKind::Decimal),
    ];
    let records = Importer::new(&NoDiagnostics).import(&path, &sheet("Staff"), &mappings)?;
    assert_eq!(records.len(), 2);
    let start = NaiveDate::from_ymd_opt(2024, 1, 30).and_then(|date| date.and_hms_opt(0, 0, 0));
    assert_eq!(records[0].get("name"), Some(&Value::String("Ann".to_owned())));
    assert_eq!(records[0].get("start"), start.map(Value::DateTime).as_ref());
    assert_eq!(records[0].get("start_text"), Some(&Value::String("1/30/24".to_owned())));
    assert_eq!(records[1].get("grade"), Some(&Value::Decimal(Decimal::new(25, 1))));

    let mappings = [ColumnMapping::new("Employee", "grade", "Grade", TargetKind::Integer)];
    let result = Importer::new(&NoDiagnostics).import(&path, &sheet("Staff"), &mappings);
    assert!(matches!(result, Err(ImportError::Conversion { row: 3, column, .. }) if column == "Grade"));
    Ok(())
}

#[test]
fn whole_numbers_as_text_have_no_fraction() -> Result<(), ImportError> {
    let directory = TempDir::new()?;
    let path = directory.path().join("ages.xls");
    xls(&path, "People", &[vec![XlsCell::Text("Age")], vec![XlsCell::Number(30.0, 0)], vec![XlsCell::Number(30.5, 0)]]);
    let mappings = [ColumnMapping::new("Person", "age", "Age", TargetKind::String)];
    let records = Importer::new(&NoDiagnostics).import(&path, &sheet("People"), &mappings)?;
    // shortest round-trip text: "30", never "30.0"
    assert_eq!(records[0].get("age"), Some(&Value::String("30".to_owned())));
    assert_eq!(records[1].get("age"), Some(&Value::String("30.5".to_owned())));
    Ok(())
}
