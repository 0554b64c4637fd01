use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

// A micro-string: either a static string or a reference-counted one.
// Type ids and attribute names are cloned on nearly every operation,
// so cloning must stay cheap.
#[derive(Debug, Clone, Eq)]
pub enum UStr {
    Static(&'static str),
    Shared(Arc<str>),
}

impl UStr {
    pub fn new(s: &str) -> Self {
        UStr::Shared(Arc::from(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self
    }
}

impl Deref for UStr {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        match self {
            UStr::Static(s) => s,
            UStr::Shared(s) => s,
        }
    }
}

impl Hash for UStr {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash as a plain str so lookups by &str find entries keyed by UStr.
        (**self).hash(state);
    }
}

impl Borrow<str> for UStr {
    #[inline]
    fn borrow(&self) -> &str {
        self
    }
}

impl AsRef<str> for UStr {
    #[inline]
    fn as_ref(&self) -> &str {
        self
    }
}

impl PartialEq for UStr {
    fn eq(&self, other: &UStr) -> bool {
        (**self).eq(&**other)
    }
}

impl PartialEq<str> for UStr {
    fn eq(&self, other: &str) -> bool {
        (**self).eq(other)
    }
}

impl PartialEq<&str> for UStr {
    fn eq(&self, other: &&str) -> bool {
        (**self).eq(*other)
    }
}

impl PartialOrd for UStr {
    fn partial_cmp(&self, other: &UStr) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UStr {
    fn cmp(&self, other: &UStr) -> std::cmp::Ordering {
        (**self).cmp(&**other)
    }
}

impl From<&'static str> for UStr {
    #[inline]
    fn from(s: &'static str) -> Self {
        UStr::Static(s)
    }
}

impl From<String> for UStr {
    #[inline]
    fn from(s: String) -> Self {
        UStr::Shared(s.into())
    }
}

impl From<&UStr> for UStr {
    #[inline]
    fn from(s: &UStr) -> Self {
        s.clone()
    }
}

impl Display for UStr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self)
    }
}
