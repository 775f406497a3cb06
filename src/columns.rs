use crate::schema::{CellValue, KeyedRow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Ean,
    Store,
    Date,
    Group,
    Product,
    Quantity,
    Price,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Ean,
        CanonicalField::Store,
        CanonicalField::Date,
        CanonicalField::Group,
        CanonicalField::Product,
        CanonicalField::Quantity,
        CanonicalField::Price,
    ];

    pub fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::Ean => &["EAN", "Código EAN del item", "Codigo EAN", "ean", "código", "codigo"],
            CanonicalField::Store => &[
                "TIENDA",
                "Descripción",
                "Punto de venta",
                "Almacén",
                "tienda",
                "almacen",
                "store",
                "sucursal",
            ],
            CanonicalField::Date => &["FECHA", "Fecha Inicial", "Fecha", "fecha", "date", "Fecha de venta"],
            CanonicalField::Group => &["GRUPO", "Grupo", "grupo", "category", "categoria", "categoría", "Categoría"],
            CanonicalField::Product => &[
                "DESCRIPCION",
                "Descripción del Ítem",
                "Producto",
                "producto",
                "descripcion",
                "product",
                "item",
                "Item",
            ],
            CanonicalField::Quantity => &[
                "Cantidad Vendida",
                "Cantidad",
                "cantidad",
                "qty",
                "quantity",
                "unidades",
                "Unidades",
            ],
            CanonicalField::Price => &[
                "Precio neto al consumido sin impuestos",
                "Precio",
                "precio",
                "price",
                "valor",
                "Valor",
            ],
        }
    }
}

/// Ordered alias lists mapping spreadsheet headers onto canonical fields.
/// Earlier aliases win when a row carries several matching columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnResolver {
    pub ean: Vec<String>,
    pub store: Vec<String>,
    pub date: Vec<String>,
    pub group: Vec<String>,
    pub product: Vec<String>,
    pub quantity: Vec<String>,
    pub price: Vec<String>,
}

impl Default for ColumnResolver {
    fn default() -> Self {
        let owned = |field: CanonicalField| {
            field
                .default_aliases()
                .iter()
                .map(|alias| alias.to_string())
                .collect::<Vec<_>>()
        };
        Self {
            ean: owned(CanonicalField::Ean),
            store: owned(CanonicalField::Store),
            date: owned(CanonicalField::Date),
            group: owned(CanonicalField::Group),
            product: owned(CanonicalField::Product),
            quantity: owned(CanonicalField::Quantity),
            price: owned(CanonicalField::Price),
        }
    }
}

impl ColumnResolver {
    pub fn aliases(&self, field: CanonicalField) -> &[String] {
        match field {
            CanonicalField::Ean => &self.ean,
            CanonicalField::Store => &self.store,
            CanonicalField::Date => &self.date,
            CanonicalField::Group => &self.group,
            CanonicalField::Product => &self.product,
            CanonicalField::Quantity => &self.quantity,
            CanonicalField::Price => &self.price,
        }
    }

    /// Replaces the alias list of one field.
    pub fn with_aliases(mut self, field: CanonicalField, aliases: Vec<String>) -> Self {
        let slot = match field {
            CanonicalField::Ean => &mut self.ean,
            CanonicalField::Store => &mut self.store,
            CanonicalField::Date => &mut self.date,
            CanonicalField::Group => &mut self.group,
            CanonicalField::Product => &mut self.product,
            CanonicalField::Quantity => &mut self.quantity,
            CanonicalField::Price => &mut self.price,
        };
        *slot = aliases;
        self
    }

    pub fn resolve<'a>(&self, row: &'a KeyedRow, field: CanonicalField) -> Option<&'a CellValue> {
        find_column_value(row, self.aliases(field))
    }
}

/// Value of the first alias that is present and not an empty string.
pub fn find_column_value<'a, S: AsRef<str>>(
    row: &'a KeyedRow,
    aliases: &[S],
) -> Option<&'a CellValue> {
    aliases
        .iter()
        .filter_map(|alias| row.get(alias.as_ref()))
        .find(|value| value.is_present())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> KeyedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_earlier_alias_wins() {
        let r = row(&[
            ("store", "Norte".into()),
            ("TIENDA", "Centro".into()),
        ]);
        let resolver = ColumnResolver::default();
        assert_eq!(
            resolver.resolve(&r, CanonicalField::Store),
            Some(&CellValue::Text("Centro".into()))
        );
    }

    #[test]
    fn test_empty_values_fall_through_to_later_aliases() {
        let r = row(&[
            ("Cantidad Vendida", CellValue::Text(String::new())),
            ("Cantidad", CellValue::Empty),
            ("qty", CellValue::Number(4.0)),
        ]);
        let resolver = ColumnResolver::default();
        assert_eq!(
            resolver.resolve(&r, CanonicalField::Quantity),
            Some(&CellValue::Number(4.0))
        );
        assert_eq!(resolver.resolve(&r, CanonicalField::Price), None);
    }

    #[test]
    fn test_overridden_aliases_replace_defaults() {
        let resolver = ColumnResolver::default()
            .with_aliases(CanonicalField::Store, vec!["Sede".to_string()]);
        let r = row(&[("TIENDA", "Centro".into()), ("Sede", "Sur".into())]);
        assert_eq!(
            resolver.resolve(&r, CanonicalField::Store),
            Some(&CellValue::Text("Sur".into()))
        );
    }
}
