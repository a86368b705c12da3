use chrono::NaiveDate;
use defi_metrics::{
    records::{read_records_file, series_set, write_records_file, RecordColumns},
    stablecoins::{
        read_stablecoin_records_file, write_stablecoin_records_file, StablecoinData,
        StablecoinRecord,
    },
    time_series::EntityKey,
};

fn date(s: &str) -> NaiveDate {
    s.parse::<NaiveDate>().unwrap()
}

#[test]
fn records_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stablecoins.csv");
    std::fs::write(
        &path,
        "date,chain,stablecoin_symbol,circulating\n\
         2025-01-02,Base,USDC,5\n\
         2025-01-01,Base,USDC,1\n\
         2025-01-02,Base,USDC,2.5\n\
         2025-01-01,Base,USDT,\n",
    )
    .unwrap();

    let columns = RecordColumns::new("date", &["chain", "stablecoin_symbol"], "circulating");
    let records = read_records_file(&path, &columns).unwrap();
    let set = series_set(records.clone());

    let usdc = &set[&EntityKey::pair("Base", "USDC")];
    assert_eq!(usdc.value_on(date("2025-01-01")), Some(1.0));
    assert_eq!(usdc.value_on(date("2025-01-02")), Some(7.5));
    assert_eq!(set[&EntityKey::pair("Base", "USDT")].value_on(date("2025-01-01")), None);

    let copy = dir.path().join("copy.csv");
    write_records_file(&copy, &columns, &records).unwrap();
    assert_eq!(read_records_file(&copy, &columns).unwrap(), records);
}

#[test]
fn stablecoin_records_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("all_stablecoins_chain_distribution.csv");
    let records = vec![
        StablecoinRecord {
            stablecoin_id: String::from("2"),
            stablecoin_name: String::from("USD Coin"),
            stablecoin_symbol: String::from("USDC"),
            date: date("2025-01-01"),
            chain: String::from("Base"),
            circulating: 100.0,
            standard: None,
        },
        StablecoinRecord {
            stablecoin_id: String::from("1"),
            stablecoin_name: String::from("Tether"),
            stablecoin_symbol: String::from("USDT"),
            date: date("2025-01-01"),
            chain: String::from("Base"),
            circulating: 300.0,
            standard: Some(String::from("native")),
        },
    ];

    write_stablecoin_records_file(&path, &records).unwrap();
    let read = read_stablecoin_records_file(&path).unwrap();
    assert_eq!(read, records);

    let data = StablecoinData::new(&read);
    assert_eq!(
        data.dominant_stablecoin("Base", date("2025-01-01")),
        Some(String::from("USDT"))
    );
    assert_eq!(data.usdc_share("Base", date("2025-01-01")), Some(0.25));
}
