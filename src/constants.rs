use crate::columns::ColumnKey;

/// Constants used by the text canonicalizer.
pub mod canonical {
    /// Delimiter used by `CanonicalMode::Delimited` when callers do not pick one.
    pub const DEFAULT_DELIMITER: char = '_';
    /// Tokens dropped by `CanonicalMode::StopwordStripped` (matched after uppercasing).
    pub const STOPWORDS: &[&str] = &[
        "DO", "DA", "DE", "UM", "UMA", "NO", "NA", "OS", "AS", "PARA", "COM", "SEM", "QUE", "EM",
    ];
}

/// Constants used by the technical synonym rewrite rules.
pub mod synonyms {
    /// Default ordered rules as `(token sequence, replacement token)` pairs.
    ///
    /// Earlier rules win: once a span is rewritten later rules see the replacement token.
    pub const DEFAULT_RULES: &[(&str, &str)] = &[
        ("APARELHO NAO LIGA", "SEM_LIGACAO"),
        ("NAO LIGA", "SEM_LIGACAO"),
        ("SEM TENSAO", "SEM_LIGACAO"),
        ("SEM IMAGEM", "SEM_IMAGEM"),
        ("LED NAO ACENDE", "LED_APAGADO"),
        ("LED NAO FUNCIONA", "LED_APAGADO"),
        ("SEM AUDIO", "SEM_AUDIO"),
        ("RUIDO NO AUDIO", "RUIDO_AUDIO"),
        ("HDMI", "HDMI_ERRO"),
        ("USB", "USB_ERRO"),
        ("BACKLIGHT", "BACKLIGHT_ERRO"),
        ("TRANSISTOR SMD", "TRANSISTOR"),
        ("CAPACITOR CERAMICO", "CAPACITOR"),
        ("RESISTOR SMD", "RESISTOR"),
    ];
}

/// Constants used by the model identity resolver.
pub mod resolver {
    /// Characters kept (besides alphanumerics and whitespace) when normalizing model text.
    pub const MODEL_PUNCTUATION: &[char] = &['-', '/', '.', '%'];
    /// Ordered structural patterns for alphanumeric model codes.
    pub const DEFAULT_STRUCTURAL_PATTERNS: &[&str] = &[
        // MO-01-21-E
        r"\b[A-Z]{2,4}-\d{2}-\d{2}-[A-Z]\b",
        // AWS-T2W-02, AWS-EV-9QF
        r"\b[A-Z]{2,4}-[A-Z0-9]{2,4}-[A-Z0-9]{2,4}\b",
        // CM-250, TM-2200
        r"\b[A-Z]{2,4}-\d{2,4}[A-Z]?\b",
    ];
    /// Manual phrase map: key phrase (matched as substring) to canonical model.
    pub const DEFAULT_PHRASE_MAP: &[(&str, &str)] = &[
        (
            "ALTO FALANTE 10POL TW",
            "TORRE DE SOM AWS-T2W-02 BIVOLT BLUETOOTH",
        ),
        (
            "ALTO FALANTE 8 3 OHMS CM-250",
            "CAIXA AMPLIFICADA CM-250 BIVOLT",
        ),
        (
            "CAIXA AMPLIFICADA CM-400 BIVOLT",
            "ALTO FALANTE 12POL. 6 OHMS CM-400/CM-550",
        ),
        (
            "CAIXA AMPLIFICADA CM-550 BIVOLT",
            "ALTO FALANTE 12POL. 6 OHMS CM-400/CM-550",
        ),
        (
            "MICRO-ONDAS MO-01-21-E 127V/60HZ",
            "MICRO-ONDAS MO-01-21-E 220V/60HZ",
        ),
        ("MICROONDAS MO-01-21-W", "MICRO-ONDAS MO-01-21-W 220V/60HZ"),
    ];
    /// Keyword groups: keyword token to candidate models in declared order.
    pub const DEFAULT_KEYWORD_GROUPS: &[(&str, &[&str])] = &[
        ("TW", &["TORRE DE SOM AWS-T2W-02 BIVOLT BLUETOOTH"]),
        ("EVAPORADOR", &["EVAPORADOR AWS-EV-9QF 220V"]),
        (
            "TORRE",
            &[
                "TORRE DE SOM AWS-T2W-02 BIVOLT BLUETOOTH",
                "TORRE DE SOM TM-2200 BIV",
            ],
        ),
        (
            "MICROONDAS",
            &[
                "MICRO-ONDAS MO-01-21-E 220V/60HZ",
                "MICRO-ONDAS MO-01-21-W 220V/60HZ",
            ],
        ),
    ];
}

/// Constants used by the catalog lookup and its persisted store.
pub mod catalog {
    /// Status label for rows whose production model is known.
    pub const STATUS_OK: &str = "OK";
    /// Status label for rows whose production model is absent.
    pub const STATUS_NOT_COUNTED: &str = "NOT_COUNTED";
    /// Status label returned when a phrase is not in the catalog at all.
    pub const STATUS_UNKNOWN: &str = "UNKNOWN";
    /// Parquet schema for the persisted lookup store.
    pub const LOOKUP_SCHEMA: &str = "
        message catalog_lookup {
            REQUIRED BYTE_ARRAY MODELO_DEFEITO (UTF8);
            REQUIRED BYTE_ARRAY SE_TRATA_DE (UTF8);
            REQUIRED BYTE_ARRAY CORRESPONDE_A (UTF8);
            REQUIRED BYTE_ARRAY MODELO_PRODUCAO (UTF8);
            REQUIRED BYTE_ARRAY MODELO_FINAL (UTF8);
            REQUIRED BYTE_ARRAY STATUS (UTF8);
        }
    ";
    /// Source id used in errors raised by the lookup store.
    pub const LOOKUP_SOURCE_ID: &str = "catalog_lookup";
}

/// Column keys recognized in source tables.
///
/// Names are matched after header normalization (see `columns::normalize_header`).
pub mod columns {
    use super::ColumnKey;

    /// Record date.
    pub const DATE: ColumnKey = ColumnKey::new("DATE", &["DATA"]);
    /// Production shift.
    pub const SHIFT: ColumnKey = ColumnKey::new("SHIFT", &["TURNO", "TURNO_PROD", "TURNO_DEFEITO"]);
    /// Production line.
    pub const LINE: ColumnKey = ColumnKey::new("LINE", &["LINHA", "LINHA_PROD", "LINHA_DEFEITO"]);
    /// Product category.
    pub const CATEGORY: ColumnKey =
        ColumnKey::new("CATEGORY", &["CATEGORIA", "CATEGORIA_PROD", "CATEGORIA_DEFEITO"]);
    /// Model text on production tables.
    pub const PRODUCTION_MODEL: ColumnKey = ColumnKey::new(
        "MODEL",
        &[
            "MODELO",
            "DESCRICAO_DO_MATERIAL",
            "DESC_MATERIAL",
            "DESCRICAO",
        ],
    );
    /// Model text on defect tables.
    pub const DEFECT_MODEL: ColumnKey =
        ColumnKey::new("MODEL", &["MODELO", "DESCRICAO", "DESCRICAO_DO_MATERIAL"]);
    /// Free-text defect description.
    pub const DESCRIPTION: ColumnKey = ColumnKey::new(
        "DESCRIPTION",
        &["DESC_FALHA", "DESCRICAO_FALHA", "DESCRICAO_ORIGINAL"],
    );
    /// Produced quantity.
    pub const QUANTITY: ColumnKey = ColumnKey::new(
        "QUANTITY",
        &["QTY_GERAL", "QUANTIDADE_PRODUZIDA", "QTD_PRODUZIDA"],
    );
    /// Defect count per row (optional; one defect per row when absent).
    pub const DEFECT_COUNT: ColumnKey = ColumnKey::new(
        "DEFECT_COUNT",
        &["QTD", "QUANTIDADE_DEFEITO", "QTD_DEFEITOS"],
    );
    /// Recorded failure code.
    pub const FAILURE_CODE: ColumnKey =
        ColumnKey::new("FAILURE_CODE", &["COD_FALHA", "CODIGO_FALHA"]);
    /// Overlay: corrected model.
    pub const CORRECTED_MODEL: ColumnKey = ColumnKey::new("MODEL", &["MODELO"]);
    /// Overlay: corrected production quantity.
    pub const PRODUCTION_QTY: ColumnKey =
        ColumnKey::new("PRODUCTION_QTY", &["QTY_GERAL", "PRODUCAO"]);
    /// Overlay: corrected PPM.
    pub const PPM: ColumnKey = ColumnKey::new("PPM", &[]);

    /// Official catalog: phrase as written in the defect log.
    pub const CATALOG_DEFECT_MODEL: ColumnKey = ColumnKey::new(
        "MODELO_DEFEITO",
        &[
            "MODELOS_DEFEITOS",
            "MODELOS_DEFEITO",
            "MODELO_DEFEITOS",
            "MODELOSDEFEITOS",
        ],
    );
    /// Official catalog: disposition note.
    pub const CATALOG_DISPOSITION: ColumnKey =
        ColumnKey::new("SE_TRATA_DE", &["SETRATADE", "SE_TRATA", "SE_TRATADE"]);
    /// Official catalog: phrase the defect model corresponds to.
    pub const CATALOG_CORRESPONDS_TO: ColumnKey = ColumnKey::new("CORRESPONDE_A", &["CORRESPONDE"]);
    /// Official catalog: production-log model phrase.
    pub const CATALOG_PRODUCTION_MODEL: ColumnKey =
        ColumnKey::new("MODELO_PRODUCAO", &["MODELOS_PRODUCAO", "MODELO_PROD"]);
    /// Persisted store: resolved final model.
    pub const CATALOG_MODEL_FINAL: ColumnKey = ColumnKey::new("MODELO_FINAL", &[]);
    /// Persisted store: status label.
    pub const CATALOG_STATUS: ColumnKey = ColumnKey::new("STATUS", &[]);
}

/// Constants used by record ingestion.
pub mod ingestion {
    /// Accepted date layouts, day-first, tried in order.
    pub const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d.%m.%Y"];
    /// Accepted date-time layouts; only the date part is kept.
    pub const DATETIME_FORMATS: &[&str] = &[
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    /// Shift spellings folded into shift `A`.
    pub const SHIFT_A_ALIASES: &[&str] = &["TURNO_A", "TURNOA", "1", "TURNO_1", "A1"];
}

/// Constants used by the PPM engine.
pub mod ppm {
    /// Scale applied to the defect/production ratio.
    pub const PPM_SCALE: f64 = 1_000_000.0;
}

/// Constants used by analytics helpers.
pub mod metrics {
    /// Z-score above which a failure code's volume is flagged.
    pub const DEFAULT_ANOMALY_Z: f64 = 2.5;
    /// Count at or below which a failure code is reported as rare.
    pub const DEFAULT_RARE_THRESHOLD: u64 = 3;
}

/// Constants used by classifier artifact persistence.
pub mod classifier {
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for persisted vectorizer/classifier payloads.
    pub const ARTIFACT_VERSION: u8 = 1;
}

/// Conventional file layout relative to a data root.
pub mod paths {
    /// Official catalog table.
    pub const OFFICIAL_CATALOG: &str = "data/raw/catalogo_modelos.csv";
    /// Production table.
    pub const PRODUCTION: &str = "data/raw/base_de_dados_prod.csv";
    /// Defect table.
    pub const DEFECTS: &str = "data/raw/base_de_dados_defeitos.csv";
    /// Optional correction overlay table.
    pub const CORRECTIONS: &str = "data/raw/correcoes.csv";
    /// Persisted lookup store (the only file the crate writes under `data/`).
    pub const LOOKUP_STORE: &str = "data/processed/catalogo_lookup.parquet";
    /// Lexicon store.
    pub const LEXICON: &str = "models/lexicon.json";
    /// Vectorizer artifact.
    pub const VECTORIZER: &str = "models/tfidf_vectorizer_v1.bin";
    /// Classifier artifact.
    pub const CLASSIFIER: &str = "models/classifier_v1.bin";
}
