/// Deterministic normalized key derived from free text.
/// Examples: `SEM_LIGACAO`, `LED APAGADO`
pub type CanonicalKey = String;
/// Failure code assigned to a defect description (empty when unclassified).
/// Examples: `F001`, `COD_17`
pub type FailureCode = String;
/// Product model name as written in a source table or resolved by the catalog.
/// Examples: `CAIXA AMPLIFICADA CM-250 BIVOLT`, `MICRO-ONDAS MO-01-21-E 220V/60HZ`
pub type ModelName = String;
/// Identifier for the table or file a row came from.
/// Examples: `production`, `defects`, `data/raw/catalogo_modelos.csv`
pub type SourceId = String;
/// Normalized column header.
/// Examples: `DATE`, `DESC_FALHA`, `MODELO_PRODUCAO`
pub type ColumnName = String;
/// Product category label.
/// Examples: `AUDIO`, `LINHA BRANCA`
pub type CategoryName = String;
/// Free-text defect description as recorded on the line.
/// Example: `Aparelho não liga após teste de queima`
pub type Description = String;
