use tabled::{settings::Style, Table, Tabled};

use crate::introspect::BindingCatalog;

#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "Binding Path")]
    path: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Render a binding catalog, one row per path.
pub fn catalog_table(catalog: &BindingCatalog) -> String {
    if catalog.is_empty() {
        return String::new();
    }
    let rows: Vec<CatalogRow> = catalog
        .iter()
        .map(|(path, entry)| CatalogRow {
            path: path.clone(),
            kind: entry.kind().to_string(),
            value: entry.to_string(),
        })
        .collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "Module")]
    module: String,
    #[tabled(rename = "Definitions")]
    definitions: String,
}

pub fn modules_table(rows: &[(String, String)]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let rows: Vec<ModuleRow> = rows
        .iter()
        .map(|(module, definitions)| ModuleRow {
            module: module.clone(),
            definitions: definitions.clone(),
        })
        .collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::CatalogEntry;
    use crate::literal::Literal;

    #[test]
    fn test_catalog_table_lists_paths() {
        let mut catalog = BindingCatalog::new();
        catalog.insert(
            "example.f.k".to_string(),
            CatalogEntry::Literal(Literal::Int(10)),
        );
        let rendered = catalog_table(&catalog);
        assert!(rendered.contains("example.f.k"));
        assert!(rendered.contains("literal"));
        assert!(rendered.contains("10"));
    }

    #[test]
    fn test_empty_catalog_renders_nothing() {
        assert_eq!(catalog_table(&BindingCatalog::new()), "");
    }
}
