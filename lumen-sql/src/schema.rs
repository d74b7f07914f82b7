//! The contacts/companies schema

/// Columns of the `contacts` table, in declaration order.
pub const CONTACT_COLUMNS: &[&str] = &[
    "Nom",
    "Prénom",
    "Email",
    "Société",
    "Domaine",
    "Secteur d'activité",
    "Poste",
    "Linkedin",
    "Téléphone",
    "Commentaire",
];

/// Columns of the `companies` table.
pub const COMPANY_COLUMNS: &[&str] = &["Société"];

/// Quote an identifier for SQLite when it contains anything but letters,
/// digits and underscores.
pub fn quote_identifier(name: &str) -> String {
    if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn create_table(table: &str, columns: &[&str]) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("{} TEXT", quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {table} ({cols})")
}

/// DDL creating both tables when absent.
pub fn bootstrap_statements() -> Vec<String> {
    vec![
        create_table("contacts", CONTACT_COLUMNS),
        create_table("companies", COMPANY_COLUMNS),
    ]
}

/// Human-readable schema listing for prompts.
pub fn describe() -> String {
    format!(
        "1. `contacts` :\n   - {}\n\n2. `companies` :\n   - {}",
        CONTACT_COLUMNS.join(", "),
        COMPANY_COLUMNS.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Nom"), "Nom");
        assert_eq!(quote_identifier("Société"), "Société");
        assert_eq!(
            quote_identifier("Secteur d'activité"),
            "\"Secteur d'activité\""
        );
    }

    #[test]
    fn test_bootstrap_quotes_spaced_column() {
        let ddl = bootstrap_statements();
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("\"Secteur d'activité\" TEXT"));
        assert!(ddl[1].starts_with("CREATE TABLE IF NOT EXISTS companies"));
    }

    #[test]
    fn test_describe_lists_both_tables() {
        let text = describe();
        assert!(text.contains("`contacts`"));
        assert!(text.contains("Téléphone"));
        assert!(text.contains("`companies`"));
    }
}
