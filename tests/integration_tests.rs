use async_trait::async_trait;
use sales_insights::*;
use std::sync::Mutex;

const POS_EXPORT: &str = "REPORTE DE VENTAS POR TIENDA\n\
Generado el 31/12/2024\n\
FECHA,TIENDA,DESCRIPCION,GRUPO,Cantidad,Precio\n\
2024-01-15,Centro,Canto PVC 22mm,Cantos,10,1500\n\
2024-01-20,Norte,Canto PVC 22mm,Cantos,4,1500\n\
2024-02-03,Centro,Rollo Vinilo,Vinilos,2,25000\n\
2024-02-10,Sur,Canto ABS,Cantos,0,1200\n\
2024-03-01,,Canto ABS,Cantos,3,1200\n\
2023-07-11,Centro,Canto PVC 22mm,Cantos,6,1400\n\
linea,rota\n";

fn source(name: &str, text: &str) -> SourceFile {
    SourceFile::new(name, text.as_bytes().to_vec())
}

struct CannedService {
    reply: String,
    prompts: Mutex<Vec<CompletionRequest>>,
}

impl CannedService {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextCompletionService for CannedService {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request);
        Ok(self.reply.clone())
    }
}

#[tokio::test]
async fn test_pos_export_end_to_end() {
    let store = InMemoryRecordStore::new();
    let summary = import_files(&store, &[source("ventas.csv", POS_EXPORT)], &IngestionConfig::default())
        .await
        .unwrap();

    assert_eq!(summary.records_added, 4);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.notice().severity, NoticeSeverity::Success);

    // reload comes back in date order
    let records = summary.records;
    assert_eq!(records[0].date, "2023-07-11");
    assert_eq!(records[0].year, Some(2023));
    assert_eq!(records[0].total, Some(8400.0));

    let metrics = calculate_metrics(&records, &load_product_groups(&store).await);
    assert_eq!(metrics.total_units, 22);
    assert!((metrics.total_revenue - 79_400.0).abs() < 1e-6);
    assert_eq!(metrics.unique_stores, 2);
    assert_eq!(metrics.top_stores[0].name, "Centro");
    assert_eq!(metrics.top_stores[0].value, 18);

    assert_eq!(available_years(&records), vec![2024, 2023]);
    assert_eq!(unique_lines(&records), vec!["Cantos", "Vinilos"]);

    let filters = ReportFilters {
        year: Some(2024),
        ..ReportFilters::default()
    };
    let ranking = generate_monthly_ranking(&records, &filters);
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].store_name, "Centro");
    assert_eq!(ranking[0].total_year, 12);
    assert_eq!(ranking[0].rankings[0], 1);
    assert_eq!(ranking[1].rankings[0], 2);

    let report = generate_store_report(&records, &filters, "Unclassified");
    assert_eq!(report.grand_total, 16);
    assert_eq!(report.line_names, vec!["Cantos", "Vinilos"]);
    assert_eq!(report.line_totals["Cantos"], 14);

    let comparison = compare_years(&records, 2024, 2023);
    assert_eq!(comparison.totals.current, 16);
    assert_eq!(comparison.totals.previous, 6);
    assert_eq!(comparison.totals.change, 10);
}

#[tokio::test]
async fn test_bad_file_does_not_block_batch() {
    let store = InMemoryRecordStore::new();
    let files = vec![
        source("inventario.csv", "codigo,descripcion,stock\n1,Canto,4\n"),
        source("ventas.csv", POS_EXPORT),
    ];
    let summary = import_files(&store, &files, &IngestionConfig::default())
        .await
        .unwrap();

    assert_eq!(summary.records_added, 4);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].file_name, "inventario.csv");
    assert_eq!(
        summary.failures[0].reason,
        "no valid header in file inventario.csv"
    );
    assert_eq!(summary.notice().severity, NoticeSeverity::Warning);

    let files = store.list_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "ventas.csv");
    assert_eq!(files[0].records_count, 4);
}

#[tokio::test]
async fn test_partial_write_keeps_committed_chunks() {
    let mut csv = String::from("FECHA,TIENDA,DESCRIPCION,Cantidad\n");
    for i in 0..1200 {
        csv.push_str(&format!("2024-05-{:02},Tienda {},Canto,1\n", i % 28 + 1, i % 3));
    }

    let store = InMemoryRecordStore::new();
    store.fail_after_chunks(2).await;
    let err = import_files(&store, &[source("grande.csv", &csv)], &IngestionConfig::default())
        .await
        .unwrap_err();

    let file_id = match err {
        SalesInsightsError::BatchWrite {
            file_id,
            chunk_index,
            offset,
            ..
        } => {
            assert_eq!(chunk_index, 2);
            assert_eq!(offset, 1000);
            file_id
        }
        other => panic!("unexpected error: {}", other),
    };
    assert_eq!(store.count().await.unwrap(), 1000);

    // the committed part is listed and can be removed as one upload
    let files = store.list_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, file_id);
    assert_eq!(files[0].file_name, "grande.csv");
    assert_eq!(files[0].records_count, 1000);
    assert_eq!(store.delete_file(&file_id).await.unwrap(), 1000);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_comma_decimal_semicolon_export() {
    let config = IngestionConfig::from_json_str(
        r#"{ "number_locale": "comma_decimal", "csv_delimiter": ";" }"#,
    )
    .unwrap();
    let text = "FECHA;TIENDA;DESCRIPCION;Cantidad;Precio\n\
                05/03/2024;Centro;Rollo Vinilo;1.200;1.500,50\n";

    let outcomes = ingest_batch(&[source("ventas.txt", text)], &config).await;
    match &outcomes[0] {
        FileOutcome::Parsed(parsed) => {
            let record = &parsed.records[0];
            assert_eq!(record.qty, 1200);
            assert_eq!(record.price, Some(1500.5));
            assert_eq!(record.year, Some(2024));
            assert_eq!(parse_sale_date(&record.date).map(|d| d.to_string()), Some("2024-03-05".to_string()));
        }
        FileOutcome::Failed(failure) => panic!("unexpected failure: {}", failure.reason),
    }
}

#[tokio::test]
async fn test_migration_then_import() -> anyhow::Result<()> {
    let legacy = InMemoryRecordStore::new();
    let primary = InMemoryRecordStore::new();
    import_files(&legacy, &[source("viejo.csv", POS_EXPORT)], &IngestionConfig::default()).await?;

    let (state, outcome) = run_migration(&legacy, &primary, MigrationState::default(), 500).await?;
    assert_eq!(state, MigrationState::Migrated);
    assert_eq!(outcome.record_count, 4);
    assert_eq!(legacy.count().await?, 0);

    let summary =
        import_files(&primary, &[source("nuevo.csv", POS_EXPORT)], &IngestionConfig::default()).await?;
    assert_eq!(summary.records.len(), 8);
    assert_eq!(primary.list_files().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_report_and_chat_over_imported_data() {
    let store = InMemoryRecordStore::new();
    let summary = import_files(&store, &[source("ventas.csv", POS_EXPORT)], &IngestionConfig::default())
        .await
        .unwrap();
    let metrics = calculate_metrics(&summary.records, &[]);

    let service = CannedService::new("```html\n<h3>1. Resumen financiero</h3>\n```");
    let html = ReportGenerator::new(&service).generate(&metrics).await.unwrap();
    assert_eq!(html, "<h3>1. Resumen financiero</h3>");

    let answer = ChatAssistant::new(&service)
        .ask("¿Cuánto vendió la tienda Norte?", &[], &summary.records)
        .await
        .unwrap();
    assert_eq!(answer.filters.store.as_deref(), Some("Norte"));
    assert!(answer.chart_kind.is_none());

    let prompts = service.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].prompt.contains("\"total_units\": 4"));
}
