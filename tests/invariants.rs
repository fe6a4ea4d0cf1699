use std::sync::Arc;

use chrono::NaiveDate;
use defect_ppm::ppm::{aggregate, ppm};
use defect_ppm::{
    CanonicalMode, Canonicalizer, CatalogLookup, CatalogRow, ClassifierArtifacts, DefectFact,
    FailureClassifier, Granularity, LabelPredictor, Lexicon, LookupStatus, LookupStore,
    ModelResolver, PredictionSource, ProductionFact, TextVectorizer,
};
use tempfile::tempdir;

const SAMPLES: &[&str] = &[
    "",
    "   ",
    "Sem ligação",
    "sem  LIGAÇÃO!!",
    "Aparelho não liga após teste de queima",
    "LED_APAGADO",
    "MICRO-ONDAS MO-01-21-E 127V/60HZ",
    "Ñandú 3º lote / peça #12",
    "caixa\tamplificada\ncm-250",
    "___---***",
    "Ação: trocar o capacitor cerâmico da placa",
];

fn modes() -> Vec<Canonicalizer> {
    vec![
        Canonicalizer::new(CanonicalMode::Delimited { delimiter: '_' }).unwrap(),
        Canonicalizer::new(CanonicalMode::Delimited { delimiter: '-' }).unwrap(),
        Canonicalizer::new(CanonicalMode::StopwordStripped).unwrap(),
    ]
}

fn delimited() -> Canonicalizer {
    Canonicalizer::new(CanonicalMode::Delimited { delimiter: '_' }).unwrap()
}

#[test]
fn canonicalize_is_idempotent_in_every_mode() {
    for canon in modes() {
        for sample in SAMPLES {
            let once = canon.canonicalize(sample);
            assert_eq!(canon.canonicalize(&once), once, "mode {:?} input {sample:?}", canon.mode());
            assert_eq!(canon.canonicalize(sample), once);
        }
        assert_eq!(canon.canonicalize_opt(None), "");
    }
}

#[test]
fn resolver_is_deterministic_and_honours_the_phrase_map() {
    let resolver = ModelResolver::with_defaults().unwrap();
    let known = vec![
        "CAIXA AMPLIFICADA CM-250 BIVOLT".to_string(),
        "GELADEIRA FROST FREE 220V".to_string(),
        "GELADEIRA DUPLEX 127V".to_string(),
    ];
    assert_eq!(
        resolver.resolve("ALTO FALANTE 10POL TW", &known).as_deref(),
        Some("TORRE DE SOM AWS-T2W-02 BIVOLT BLUETOOTH")
    );
    for sample in SAMPLES.iter().chain(["geladeira", "geladeira 127v"].iter()) {
        let first = resolver.resolve(sample, &known);
        for _ in 0..5 {
            assert_eq!(resolver.resolve(sample, &known), first, "input {sample:?}");
        }
    }
}

#[test]
fn lookup_status_follows_production_membership() {
    let canon = delimited();
    let official = vec![
        CatalogRow::new("CM-250 FALANTE", "CAIXA CM-250"),
        CatalogRow::new("PLACA", ""),
        CatalogRow::new("TORRE", "  ").with_corresponds_to("TORRE TM-2200"),
        CatalogRow::new("EVAPORADOR", "Evaporador AWS-EV-9QF"),
    ];
    let persisted = vec![CatalogRow::new("placa", "TV 50")];
    let lookup = CatalogLookup::build(canon, &official, &persisted);
    let production = lookup.production_keys();
    for entry in lookup.entries() {
        let expected = !entry.production_key.is_empty()
            && production.contains(entry.production_key.as_str());
        assert_eq!(entry.status == LookupStatus::Ok, expected, "{entry:?}");
        assert_ne!(entry.status, LookupStatus::Unknown);
    }
    assert_eq!(lookup.resolve("Placa").1, LookupStatus::Ok);
    assert_eq!(lookup.resolve("torre").1, LookupStatus::NotCounted);
    assert_eq!(
        lookup.resolve("nada disso"),
        ("nada disso".to_string(), LookupStatus::Unknown)
    );
}

#[test]
fn update_keeps_only_the_last_supplied_row_per_key() {
    let dir = tempdir().unwrap();
    let store = LookupStore::new(dir.path().join("lookup.parquet"));
    let canon = delimited();
    let entries = store
        .update(
            &canon,
            &[
                CatalogRow::new("Modelo X", "PROD A").with_disposition("first"),
                CatalogRow::new("Modelo Y", "PROD Y"),
                CatalogRow::new("modelo x", "PROD B").with_disposition("second"),
            ],
        )
        .unwrap();
    let x: Vec<_> = entries.iter().filter(|e| e.key == "MODELO_X").collect();
    assert_eq!(x.len(), 1);
    assert_eq!(x[0].row.production_model, "PROD B");
    assert_eq!(x[0].row.disposition, "second");
}

#[test]
fn update_then_resolve_reports_not_counted() {
    let dir = tempdir().unwrap();
    let store = LookupStore::new(dir.path().join("lookup.parquet"));
    let mut catalog = defect_ppm::Catalog::open(delimited(), Vec::new(), store).unwrap();
    catalog.update(&[CatalogRow::new("X", "")]).unwrap();
    assert_eq!(catalog.resolve("X"), ("X".to_string(), LookupStatus::NotCounted));
}

fn defect(model: &str, count: u64) -> DefectFact {
    DefectFact {
        date: NaiveDate::from_ymd_opt(2024, 6, 1),
        model: model.to_string(),
        model_key: model.to_string(),
        category: "AUDIO".to_string(),
        failure_code: "F001".to_string(),
        description: "NAO LIGA".to_string(),
        count,
    }
}

fn produced(model: &str, quantity: f64) -> ProductionFact {
    ProductionFact {
        date: NaiveDate::from_ymd_opt(2024, 6, 1),
        model: model.to_string(),
        model_key: model.to_string(),
        category: "AUDIO".to_string(),
        quantity,
    }
}

#[test]
fn ppm_never_divides_by_zero() {
    assert_eq!(ppm(10, 0.0), 0.0);
    for granularity in [
        Granularity::Day,
        Granularity::Month,
        Granularity::Year,
        Granularity::Model,
    ] {
        let buckets = aggregate(&[defect("A", 3)], &[produced("A", 0.0)], granularity);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].ppm, 0.0);
        assert!(buckets[0].ppm.is_finite());
    }
}

#[test]
fn every_defect_group_survives_the_join() {
    let defects = vec![defect("A", 1), defect("B", 2), defect("C", 3), defect("A", 1)];
    let production = vec![produced("A", 1000.0), produced("Z", 5.0)];
    for granularity in [
        Granularity::Day,
        Granularity::Month,
        Granularity::Year,
        Granularity::Model,
    ] {
        let buckets = aggregate(&defects, &production, granularity);
        let groups: Vec<&str> = buckets.iter().map(|b| b.key.group.as_str()).collect();
        assert_eq!(groups, vec!["A", "B", "C"]);
        let total: u64 = buckets.iter().map(|b| b.defect_count).sum();
        assert_eq!(total, 7);
    }
}

#[test]
fn five_defects_over_one_hundred_thousand_units_is_fifty_ppm() {
    let buckets = aggregate(&[defect("A", 5)], &[produced("A", 100_000.0)], Granularity::Model);
    assert_eq!(buckets[0].ppm, 50.0);
}

struct FixedVectorizer;

impl TextVectorizer for FixedVectorizer {
    fn transform(&self, _text: &str) -> Vec<f32> {
        vec![1.0]
    }

    fn width(&self) -> usize {
        1
    }
}

struct AlwaysF999;

impl LabelPredictor for AlwaysF999 {
    fn predict(&self, _features: &[f32]) -> Option<String> {
        Some("F999".to_string())
    }
}

#[test]
fn lexicon_hit_wins_with_or_without_a_model() {
    let canon = delimited();
    let lexicon = Arc::new(Lexicon::from_entries([("SEM_LIGACAO", "F001")]));
    let lexicon_only = FailureClassifier::new(canon, lexicon.clone(), None);
    let with_model = FailureClassifier::new(
        canon,
        lexicon,
        Some(ClassifierArtifacts::new(
            Arc::new(FixedVectorizer),
            Arc::new(AlwaysF999),
        )),
    );
    assert_eq!(lexicon_only.predict("sem ligação"), "F001");
    assert_eq!(with_model.predict("sem ligação"), "F001");
    assert_eq!(
        with_model.predict_detailed("sem ligação").source,
        PredictionSource::Lexicon
    );
    assert_eq!(with_model.predict("barulho estranho"), "F999");
    assert_eq!(lexicon_only.predict("barulho estranho"), "");
}
