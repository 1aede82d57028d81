use std::borrow::Cow;

/// Provider identifier - mostly static constants, owned for configured feeds
pub type ProviderId = Cow<'static, str>;
