use super::ObjectPath;

#[test]
fn legal_paths() {
    assert!(ObjectPath::new("").is_err());
    assert!(ObjectPath::new("a").is_err());
    assert!(ObjectPath::new("/").is_ok());
    assert!(ObjectPath::new("/a").is_ok());
    assert!(ObjectPath::new("//").is_err());
    assert!(ObjectPath::new("/se/tedro").is_ok());
    assert!(ObjectPath::new("/se/tedro/").is_err());
    assert!(ObjectPath::new("/org/freedesktop/DBus").is_ok());
    assert!(ObjectPath::new("/with_underscore/x1").is_ok());
    assert!(ObjectPath::new("/with-dash").is_err());
    assert!(ObjectPath::new("/a//b").is_err());
}

#[test]
fn namespaces() -> Result<(), super::ObjectPathError> {
    let ns = ObjectPath::new("/a/b")?;
    assert!(ObjectPath::new("/a/b")?.starts_with(ns));
    assert!(ObjectPath::new("/a/b/c")?.starts_with(ns));
    assert!(!ObjectPath::new("/a/bc")?.starts_with(ns));
    assert!(!ObjectPath::new("/a")?.starts_with(ns));
    Ok(())
}
