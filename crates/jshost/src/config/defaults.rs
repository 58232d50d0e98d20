// Various default functions to be used by serde

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_runtime_name() -> String {
    "runtime1".into()
}

pub(crate) fn default_host() -> String {
    "127.0.0.1".into()
}
