/// URI versioning: a route is served under `/{prefix}{version}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersioningOptions {
    pub default_version: String,
    pub prefix: String,
}

impl VersioningOptions {
    pub fn uri(default_version: impl Into<String>) -> Self {
        VersioningOptions {
            default_version: default_version.into(),
            prefix: "v".into(),
        }
    }

    pub fn resolve<'a>(&'a self, version: Option<&'a str>) -> &'a str {
        version.unwrap_or(&self.default_version)
    }

    pub fn versioned_path(&self, version: Option<&str>, path: &str) -> String {
        let version = self.resolve(version);
        let path = path.trim_start_matches('/');

        if path.is_empty() {
            format!("/{}{}", self.prefix, version)
        } else {
            format!("/{}{}/{}", self.prefix, version, path)
        }
    }
}
