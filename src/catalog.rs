//! Built-in catalog of vulnerability and anomaly categories. Loaded once,
//! read-only afterwards; a module asking for a category that is missing is
//! a configuration error, not a silent fallback.

use std::collections::HashMap;

use crate::error::ScanError;

#[derive(Debug, Clone)]
pub struct CategoryInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub solution: &'static str,
    pub references: &'static [&'static str],
}

pub const SQL_INJECTION: &str = "SQL Injection";
pub const XSS: &str = "Cross Site Scripting";
pub const BACKUP_FILE: &str = "Backup file";
pub const HTACCESS_BYPASS: &str = "Htaccess Bypass";
pub const INTERNAL_ERROR: &str = "Internal Server Error";
pub const RESOURCE_CONSUMPTION: &str = "Resource consumption";

const ENTRIES: &[CategoryInfo] = &[
    CategoryInfo {
        name: SQL_INJECTION,
        description: "SQL injection vulnerabilities let an attacker alter the \
            queries an application sends to its database.",
        solution: "Use prepared statements and keep user input out of query text.",
        references: &[
            "http://www.owasp.org/index.php/SQL_Injection",
            "http://en.wikipedia.org/wiki/SQL_injection",
        ],
    },
    CategoryInfo {
        name: XSS,
        description: "Cross-site scripting lets an attacker inject script into \
            pages served to other users.",
        solution: "Encode or strip user-supplied data before writing it into HTML.",
        references: &[
            "http://www.owasp.org/index.php/Cross_Site_Scripting",
            "http://en.wikipedia.org/wiki/Cross-site_scripting",
        ],
    },
    CategoryInfo {
        name: BACKUP_FILE,
        description: "A backup or copy of a server-side script is readable and \
            may expose source code or credentials.",
        solution: "Remove editor and backup copies from the document root.",
        references: &["http://www.owasp.org/index.php/Information_Leakage"],
    },
    CategoryInfo {
        name: HTACCESS_BYPASS,
        description: "An access-restricted resource answers normally when \
            requested with an unexpected HTTP method.",
        solution: "Restrict every method, not only GET and POST, in the access \
            configuration.",
        references: &["http://www.aldeid.com/index.php/Htaccess-bypass"],
    },
    CategoryInfo {
        name: INTERNAL_ERROR,
        description: "The server answered with an internal error; the probe put \
            the application in an unexpected state.",
        solution: "More information about the error condition is needed to \
            assess impact.",
        references: &["http://en.wikipedia.org/wiki/List_of_HTTP_status_codes"],
    },
    CategoryInfo {
        name: RESOURCE_CONSUMPTION,
        description: "The request took an abnormal time to complete; the probe \
            likely drives an expensive code path.",
        solution: "Limit the work a single request may trigger.",
        references: &["http://www.owasp.org/index.php/Asymmetric_resource_consumption_(amplification)"],
    },
];

pub struct Catalog {
    entries: HashMap<&'static str, &'static CategoryInfo>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Catalog {
            entries: ENTRIES.iter().map(|e| (e.name, e)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&'static CategoryInfo, ScanError> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| ScanError::Config(format!("unknown report category '{}'", name)))
    }
}
