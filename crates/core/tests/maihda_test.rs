//! End-to-end MAIHDA analyses: strata, fit, variance partition, PVC.
//!
//! The survey data has six intersectional strata (gender x race). Each
//! stratum mean is `2 * x + r`, where `x` is a stratum-level covariate and
//! `r` a stratum effect the covariate does not explain, so adding `x` to the
//! model removes most but not all of the between-stratum variance.

use approx::assert_relative_eq;
use maihda_core::bootstrap::BootstrapConfig;
use maihda_core::data::DataFrame;
use maihda_core::error::MaihdaError;
use maihda_core::fit::FittedModel;
use maihda_core::glmm::Family;
use maihda_core::pvc::{calculate_pvc, PvcOptions};
use maihda_core::report::{compare, summarize};
use maihda_core::strata::{build_strata, StrataOptions, StrataTable, STRATUM_COLUMN};
use maihda_core::variance::{variance_components, vpc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CELLS: [(&str, &str, f64, f64); 6] = [
    ("F", "Asian", 0.0, 0.8),
    ("F", "Black", 1.0, -0.6),
    ("F", "White", 2.0, 0.4),
    ("M", "Asian", 1.5, -0.9),
    ("M", "Black", 3.0, 0.7),
    ("M", "White", 0.5, -0.4),
];

fn survey(per_cell: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut gender = Vec::new();
    let mut race = Vec::new();
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (g, r, xs, rs) in CELLS {
        for _ in 0..per_cell {
            gender.push(g);
            race.push(r);
            x.push(xs);
            y.push(2.0 * xs + rs + rng.gen_range(-1.5..1.5));
        }
    }
    let mut df = DataFrame::new();
    df.add_factor_column("gender", &gender).unwrap();
    df.add_factor_column("race", &race).unwrap();
    df.add_float_column("x", x).unwrap();
    df.add_float_column("y", y).unwrap();
    df
}

fn stratified(per_cell: usize, seed: u64) -> (DataFrame, StrataTable) {
    build_strata(
        &survey(per_cell, seed),
        &["gender", "race"],
        &StrataOptions::default(),
    )
    .unwrap()
}

fn fit(formula: &str, data: &DataFrame, table: &StrataTable) -> FittedModel {
    FittedModel::builder()
        .formula(formula)
        .data(data.clone())
        .strata(table.clone())
        .fit()
        .unwrap()
}

#[test]
fn test_four_distinct_combinations() {
    let mut df = DataFrame::new();
    df.add_factor_column("gender", &["M", "F", "M", "F"]).unwrap();
    df.add_factor_column("race", &["White", "Black", "Black", "White"])
        .unwrap();
    let (out, table) = build_strata(&df, &["gender", "race"], &StrataOptions::default()).unwrap();

    let labels: Vec<&str> = table.strata.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["F_Black", "F_White", "M_Black", "M_White"]);
    assert!(table.strata.iter().all(|s| s.n == 1));
    assert!(out.get_integer(STRATUM_COLUMN).unwrap().iter().all(Option::is_some));
}

#[test]
fn test_all_missing_variable_leaves_every_row_unassigned() {
    let mut df = DataFrame::new();
    df.add_factor_column("gender", &["M", "F", "M", "F"]).unwrap();
    df.add_factor_column_with_missing("race", &[None, None, None, None])
        .unwrap();
    let (out, table) = build_strata(&df, &["gender", "race"], &StrataOptions::default()).unwrap();

    assert!(table.is_empty());
    assert_eq!(table.total_count(), 0);
    assert!(out.get_integer(STRATUM_COLUMN).unwrap().iter().all(Option::is_none));
}

#[test]
fn test_rare_combination_excluded_by_min_count() {
    let mut gender = vec!["F", "F"];
    let mut race = vec!["Black", "Black"];
    let others = [("M", "White"), ("M", "Black"), ("F", "White")];
    for i in 0..98 {
        let (g, r) = others[i % 3];
        gender.push(g);
        race.push(r);
    }
    let mut df = DataFrame::new();
    df.add_factor_column("gender", &gender).unwrap();
    df.add_factor_column("race", &race).unwrap();

    let options = StrataOptions::new().min_count(10);
    let (out, table) = build_strata(&df, &["gender", "race"], &options).unwrap();

    assert!(table.strata.iter().all(|s| s.label != "F_Black"));
    assert_eq!(table.len(), 3);
    let ids: Vec<usize> = table.strata.iter().map(|s| s.stratum).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(table.total_count(), 98);

    let stratum = out.get_integer(STRATUM_COLUMN).unwrap();
    assert_eq!(&stratum[..2], &[None, None]);
    assert!(stratum[2..].iter().all(Option::is_some));
}

#[test]
fn test_strata_from_csv_with_missing_cells() {
    let text = "gender,race,y\nM,White,1.0\nF,NA,2.0\nF,Black,3.0\n,Black,4.0\nM,White,5.0\n";
    let df = DataFrame::from_csv_str(text).unwrap();
    let (out, table) = build_strata(&df, &["gender", "race"], &StrataOptions::default()).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.strata[1].label, "M_White");
    assert_eq!(table.strata[1].n, 2);
    assert_eq!(
        out.get_integer(STRATUM_COLUMN).unwrap(),
        &[Some(2), None, Some(1), None, Some(2)]
    );
}

#[test]
fn test_null_model_partitions_variance() {
    let (data, table) = stratified(20, 42);
    let model = fit("y ~ 1 + (1 | stratum)", &data, &table);

    assert_eq!(model.n_obs(), 120);
    assert!(model.handle().converged());

    let vc = variance_components(&model).unwrap();
    assert!(vc.vpc > 0.0 && vc.vpc < 1.0);
    assert_relative_eq!(
        vc.between.proportion + vc.within.proportion,
        1.0,
        epsilon = 1e-9
    );
    assert_relative_eq!(vc.total.variance, vc.between.variance + vc.within.variance);
    assert_relative_eq!(vpc(&model).unwrap(), vc.vpc);

    // Stratum means range over roughly 2x + r in [-0.9, 6.7]; the noise
    // variance is 0.75.
    assert!(vc.between.variance > 2.0);
    assert!(vc.within.variance > 0.4 && vc.within.variance < 1.2);
}

#[test]
fn test_covariate_explains_between_stratum_variance() {
    let (data, table) = stratified(20, 42);
    let null = fit("y ~ 1 + (1 | stratum)", &data, &table);
    let adjusted = fit("y ~ 1 + x + (1 | stratum)", &data, &table);

    let result = calculate_pvc(&null, &adjusted, &PvcOptions::new()).unwrap();
    assert!(result.var_model2 < result.var_model1);
    assert!(result.pvc > 0.0);
    assert_eq!(
        result.pvc,
        (result.var_model1 - result.var_model2) / result.var_model1
    );
    assert!(result.warnings.is_empty());
    assert!(result.ci_lower.is_none());
}

#[test]
fn test_refit_on_same_data_gives_zero_pvc() {
    let (data, table) = stratified(10, 7);
    let model = fit("y ~ 1 + (1 | stratum)", &data, &table);
    let again = model.refit(data.clone()).unwrap();

    let result = calculate_pvc(&model, &again, &PvcOptions::new()).unwrap();
    assert!(result.pvc.abs() < 1e-9);
}

#[test]
fn test_pvc_bootstrap_interval_contains_estimate() {
    let (data, table) = stratified(20, 42);
    let null = fit("y ~ 1 + (1 | stratum)", &data, &table);
    let adjusted = fit("y ~ 1 + x + (1 | stratum)", &data, &table);

    let options = PvcOptions::new()
        .bootstrap(true)
        .config(BootstrapConfig::new().n_boot(50).seed(2024));
    let result = calculate_pvc(&null, &adjusted, &options).unwrap();

    let (lower, upper) = (result.ci_lower.unwrap(), result.ci_upper.unwrap());
    assert!(lower <= result.pvc && result.pvc <= upper);
    assert_eq!(result.conf_level, Some(0.95));
    assert!(result.n_boot_success.unwrap() >= 25);
}

#[test]
fn test_seeded_bootstrap_is_reproducible() {
    let (data, table) = stratified(8, 3);
    let null = fit("y ~ 1 + (1 | stratum)", &data, &table);
    let adjusted = fit("y ~ 1 + x + (1 | stratum)", &data, &table);

    let config = BootstrapConfig::new().n_boot(20).seed(9);
    let sequential = PvcOptions::new().bootstrap(true).config(config.clone());
    let parallel = PvcOptions::new()
        .bootstrap(true)
        .config(config.parallel(true));

    let a = calculate_pvc(&null, &adjusted, &sequential).unwrap();
    let b = calculate_pvc(&null, &adjusted, &parallel).unwrap();
    assert_eq!(a.ci_lower, b.ci_lower);
    assert_eq!(a.ci_upper, b.ci_upper);
}

#[test]
fn test_boundary_reference_model_rejected_with_or_without_bootstrap() {
    // Every stratum has the same values: no between-stratum variance.
    let mut race = Vec::new();
    let mut y = Vec::new();
    for r in ["Asian", "Black", "White"] {
        for v in [1.0, 2.0, 3.0, 4.0] {
            race.push(r);
            y.push(v);
        }
    }
    let mut df = DataFrame::new();
    df.add_factor_column("race", &race).unwrap();
    df.add_float_column("y", y).unwrap();
    let (data, table) = build_strata(&df, &["race"], &StrataOptions::default()).unwrap();
    let model = fit("y ~ 1 + (1 | stratum)", &data, &table);

    assert_eq!(vpc(&model).unwrap(), 0.0);
    assert!(!model.warnings().is_empty());

    for options in [
        PvcOptions::new(),
        PvcOptions::new()
            .bootstrap(true)
            .config(BootstrapConfig::new().n_boot(10).seed(1)),
    ] {
        let err = calculate_pvc(&model, &model, &options).unwrap_err();
        assert!(matches!(err, MaihdaError::NonPositiveVariance(v) if v == 0.0));
    }
}

#[test]
fn test_binary_outcome_uses_latent_residual_variance() {
    let mut gender = Vec::new();
    let mut y = Vec::new();
    for (g, ones) in [("F", 3), ("M", 12), ("X", 7)] {
        for i in 0..20 {
            gender.push(g);
            y.push(if i < ones { 1.0 } else { 0.0 });
        }
    }
    let mut df = DataFrame::new();
    df.add_factor_column("gender", &gender).unwrap();
    df.add_float_column("y", y).unwrap();
    let (data, table) = build_strata(&df, &["gender"], &StrataOptions::default()).unwrap();

    let model = FittedModel::builder()
        .formula("y ~ 1 + (1 | stratum)")
        .data(data)
        .strata(table)
        .family(Family::Binomial)
        .fit()
        .unwrap();

    let vc = variance_components(&model).unwrap();
    assert_relative_eq!(vc.within.variance, std::f64::consts::PI.powi(2) / 3.0);
    assert!(vc.between.variance > 0.0);
    assert!(vc.vpc > 0.0 && vc.vpc < 1.0);
}

#[test]
fn test_summary_and_comparison_report() {
    let (data, table) = stratified(20, 42);
    let null = fit("y ~ 1 + (1 | stratum)", &data, &table);
    let adjusted = fit("y ~ 1 + x + (1 | stratum)", &data, &table);

    let summary = summarize(&null, None).unwrap();
    assert_eq!(summary.strata.len(), 6);
    assert_eq!(summary.strata[0].label.as_deref(), Some("F_Asian"));
    assert!(summary.strata.iter().all(|s| s.n == Some(20)));
    // M_Black has the largest stratum mean.
    let top = summary
        .strata
        .iter()
        .max_by(|a, b| a.estimate.total_cmp(&b.estimate))
        .unwrap();
    assert_eq!(top.label.as_deref(), Some("M_Black"));

    let cmp = compare(&[("null", &null), ("adjusted", &adjusted)]).unwrap();
    assert_eq!(cmp.rows[0].pvc, None);
    let pvc = calculate_pvc(&null, &adjusted, &PvcOptions::new()).unwrap().pvc;
    assert_eq!(cmp.rows[1].pvc, Some(pvc));
    assert!(cmp.rows[1].vpc < cmp.rows[0].vpc);
}

#[test]
fn test_summary_vpc_interval_from_refits_contains_estimate() {
    let (data, table) = stratified(20, 42);
    let null = fit("y ~ 1 + (1 | stratum)", &data, &table);

    let config = BootstrapConfig::new().n_boot(50).seed(77);
    let summary = summarize(&null, Some(&config)).unwrap();
    let ci = summary.vpc_ci.as_ref().unwrap();

    assert!(ci.lower <= summary.components.vpc && summary.components.vpc <= ci.upper);
    assert!(ci.lower < ci.upper);
    assert!(ci.n_success >= 25);
    assert_eq!(ci.n_requested, 50);
    for w in &ci.warnings {
        assert!(summary.warnings.contains(w));
    }
}
