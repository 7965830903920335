//! Batch statistics runs against the in-memory repository.

mod support;

use pheno_stats::api::{AltitudeBand, Phenophase, WeeklyAggregate, YearlyAltitudeStatistic, YearlySpeciesStatistic};
use pheno_stats::db::repository::DocumentStore;
use pheno_stats::db::{BatchWrite, Filter, LocalRepository, StatisticsConfig};
use pheno_stats::services::StatisticsRunner;
use support::{date, observation, seeded_repository};

fn seed_year(repo: &LocalRepository, year: i32, count: u32) {
    for i in 0..count {
        let individual = if i % 2 == 0 { "low" } else { "high" };
        repo.insert_observation(&observation(
            &format!("{}_{}", year, i),
            individual,
            year,
            "BEA",
            "globe",
            date(year, 4, 1 + i % 28),
        ))
        .unwrap();
    }
}

async fn stored<T: serde::de::DeserializeOwned>(repo: &LocalRepository, collection: &str, id: &str) -> T {
    repo.get(collection, id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("missing {}/{}", collection, id))
        .decode()
        .unwrap()
}

#[tokio::test]
async fn test_process_year_writes_every_document_kind() {
    let repo = seeded_repository();
    seed_year(&repo, 2023, 6);
    let mut flagged = observation("dup", "low", 2023, "BEA", "globe", date(2023, 1, 1));
    flagged.comment = Some("duplicate".to_string());
    repo.insert_observation(&flagged).unwrap();
    repo.insert_observation(&observation("lost", "nowhere", 2023, "BEA", "globe", date(2023, 4, 3)))
        .unwrap();
    repo.insert_observation(&observation("other", "low", 2023, "XXX", "globe", date(2023, 4, 3)))
        .unwrap();

    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());
    let summary = runner.process_year(2023).await.unwrap();

    assert_eq!(summary.observations, 7);
    assert_eq!(summary.one_year_aggregates, 2);
    assert_eq!(summary.species_statistics, 2);
    assert_eq!(summary.altitude_statistics, 2);
    assert_eq!(summary.writes, 6);

    let low: WeeklyAggregate = stored(&repo, "statistics", "2023_2023_Fagus_alt1_BEA").await;
    assert_eq!(low.agg_obs_sum, 3);
    assert_eq!(low.years, 1);

    let species: YearlySpeciesStatistic = stored(&repo, "statistics_yearly_species", "2023_Fagus_all").await;
    let bea = species.values[&Phenophase::from("BEA")];
    assert_eq!(bea.obs_sum, 7);
    assert_eq!(bea.min, date(2023, 4, 1));

    let altitude: YearlyAltitudeStatistic = stored(&repo, "statistics_yearly_altitude", "2023_Fagus_globe").await;
    let bands = &altitude.values[&Phenophase::from("BEA")];
    assert_eq!(bands[&AltitudeBand::Alt1].obs_sum, 3);
    assert_eq!(bands[&AltitudeBand::Alt5].obs_sum, 3);
}

#[tokio::test]
async fn test_process_year_is_idempotent_and_drops_stale_aggregates() {
    let repo = seeded_repository();
    seed_year(&repo, 2023, 4);
    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());

    runner.process_year(2023).await.unwrap();
    let first = repo.query("statistics", &[]).await.unwrap();
    runner.process_year(2023).await.unwrap();
    let second = repo.query("statistics", &[]).await.unwrap();
    let data = |docs: &Vec<pheno_stats::db::Document>| docs.iter().map(|d| d.data.clone()).collect::<Vec<_>>();
    assert_eq!(data(&first), data(&second));

    // Every observation of the high individual disappears.
    for i in [1, 3] {
        repo.delete("observations", &format!("2023_{}", i)).await.unwrap();
    }
    let summary = runner.process_year(2023).await.unwrap();
    assert_eq!(summary.removed_aggregates, 1);
    assert!(repo.get("statistics", "2023_2023_Fagus_alt5_BEA").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_year_writes_no_yearly_statistics() {
    let repo = seeded_repository();
    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());

    let summary = runner.process_year(1990).await.unwrap();
    assert_eq!(summary.observations, 0);
    assert_eq!(summary.writes, 0);
    assert_eq!(repo.document_count("statistics_yearly_species"), 0);
}

#[tokio::test]
async fn test_rollover_builds_windows_for_previous_year() {
    let repo = seeded_repository();
    for year in 2018..=2022 {
        let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());
        seed_year(&repo, year, 10);
        runner.process_year(year).await.unwrap();
    }
    repo.set_phenoyear(2023).unwrap();

    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());
    let summary = runner.process_rollover().await.unwrap();
    assert_eq!(summary.year.year, 2022);
    assert_eq!(summary.windows.end_year, 2022);
    // Two bands for each of the 5- and 30-year windows.
    assert_eq!(summary.windows.windows, 4);
    // Both bands hold 25 observations over 5 complete years; 30-year windows are incomplete.
    assert_eq!(summary.windows.valid_windows, 2);

    let five: WeeklyAggregate = stored(&repo, "statistics", "2018_2022_Fagus_alt1_BEA").await;
    assert_eq!(five.agg_range, 5);
    assert_eq!(five.years, 5);
    assert_eq!(five.agg_obs_sum, 25);
    assert_eq!(five.year_obs_sum.len(), 5);

    let thirty: WeeklyAggregate = stored(&repo, "statistics", "1993_2022_Fagus_alt5_BEA").await;
    assert_eq!(thirty.agg_range, 30);
    assert_eq!(thirty.years, 5);
    assert!(!thirty.is_valid(20));

    // Windows are never read back as 1-year aggregates.
    let one_year = repo
        .query("statistics", &[Filter::eq("agg_range", 1), Filter::eq("end_year", 2022)])
        .await
        .unwrap();
    assert_eq!(one_year.len(), 2);
}

#[tokio::test]
async fn test_current_year_requires_phenoyear() {
    let repo = seeded_repository();
    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());

    let err = runner.process_current_year().await.unwrap_err();
    assert!(err.to_string().contains("phenoyear"));

    repo.set_phenoyear(2023).unwrap();
    seed_year(&repo, 2023, 2);
    assert_eq!(runner.process_current_year().await.unwrap().year, 2023);
}

#[tokio::test]
async fn test_small_batches_write_everything() {
    let repo = seeded_repository();
    seed_year(&repo, 2023, 6);
    let mut config = StatisticsConfig::default();
    config.store.batch_size = 1;

    let summary = StatisticsRunner::new(&repo, config).process_year(2023).await.unwrap();
    assert_eq!(summary.writes, 6);

    // A direct oversized commit is refused by the store.
    let writes: Vec<_> = (0..501)
        .map(|i| BatchWrite::set("scratch", i.to_string(), Default::default()))
        .collect();
    assert!(repo.commit_batch(writes).await.is_err());
}

#[tokio::test]
async fn test_unhealthy_store_fails_with_context() {
    let repo = seeded_repository();
    repo.set_healthy(false);
    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());

    let err = runner.process_year(2023).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load observations for 2023"));
}

#[tokio::test]
async fn test_rerun_drops_yearly_statistics_without_observations() {
    let repo = seeded_repository();
    repo.insert_observation(&observation("g1", "low", 2023, "BEA", "globe", date(2023, 4, 2)))
        .unwrap();
    repo.insert_observation(&observation("m1", "low", 2023, "BEA", "meteo", date(2023, 4, 5)))
        .unwrap();
    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());

    runner.process_year(2023).await.unwrap();
    assert_eq!(repo.document_count("statistics_yearly_species"), 3);
    assert_eq!(repo.document_count("statistics_yearly_altitude"), 3);

    repo.delete("observations", "m1").await.unwrap();
    let summary = runner.process_year(2023).await.unwrap();
    assert_eq!(summary.removed_yearly_statistics, 2);
    for collection in ["statistics_yearly_species", "statistics_yearly_altitude"] {
        assert!(repo.get(collection, "2023_Fagus_meteo").await.unwrap().is_none());
        assert!(repo.get(collection, "2023_Fagus_globe").await.unwrap().is_some());
    }
    let all: YearlySpeciesStatistic = stored(&repo, "statistics_yearly_species", "2023_Fagus_all").await;
    assert_eq!(all.values[&Phenophase::from("BEA")].obs_sum, 1);

    // Emptying the year removes every derived document of it.
    repo.delete("observations", "g1").await.unwrap();
    let summary = runner.process_year(2023).await.unwrap();
    assert_eq!(summary.removed_aggregates, 1);
    assert_eq!(summary.removed_yearly_statistics, 4);
    assert_eq!(repo.document_count("statistics"), 0);
    assert_eq!(repo.document_count("statistics_yearly_species"), 0);
    assert_eq!(repo.document_count("statistics_yearly_altitude"), 0);
}

#[tokio::test]
async fn test_rerun_drops_windows_without_input() {
    let repo = seeded_repository();
    for year in 2018..=2022 {
        seed_year(&repo, year, 2);
    }
    // The only observation of the high band falls in 2020.
    for year in 2018..=2022 {
        repo.delete("observations", &format!("{}_1", year)).await.unwrap();
    }
    repo.insert_observation(&observation("h", "high", 2020, "BEA", "globe", date(2020, 4, 9)))
        .unwrap();

    let runner = StatisticsRunner::new(&repo, StatisticsConfig::default());
    for year in 2018..=2022 {
        runner.process_year(year).await.unwrap();
    }
    let summary = runner.process_windows(2022).await.unwrap();
    assert_eq!(summary.windows, 4);
    assert_eq!(summary.removed_windows, 0);
    let high: WeeklyAggregate = stored(&repo, "statistics", "2018_2022_Fagus_alt5_BEA").await;
    assert_eq!(high.agg_obs_sum, 1);

    repo.delete("observations", "h").await.unwrap();
    runner.process_year(2020).await.unwrap();
    let summary = runner.process_windows(2022).await.unwrap();
    assert_eq!(summary.windows, 2);
    assert_eq!(summary.removed_windows, 2);
    assert!(repo.get("statistics", "2018_2022_Fagus_alt5_BEA").await.unwrap().is_none());
    assert!(repo.get("statistics", "1993_2022_Fagus_alt5_BEA").await.unwrap().is_none());

    let low: WeeklyAggregate = stored(&repo, "statistics", "2018_2022_Fagus_alt1_BEA").await;
    assert_eq!(low.agg_obs_sum, 5);
    assert_eq!(low.years, 5);
}
