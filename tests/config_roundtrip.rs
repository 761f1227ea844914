//! Config round-trips through an actual file on disk: parse, load into a
//! sheriff, save back out, write, reparse, and compare (spec §4.1, §4.4).

use sheriff::bus::InMemoryBus;
use sheriff::Sheriff;
use std::io::Write;

#[tokio::test]
async fn config_survives_a_write_load_save_write_round_trip() {
    let src = r#"
        group "svc" {
            cmd "web" { exec = "/bin/web"; host = "h1"; auto_respawn = true; }
            cmd { exec = "/bin/side"; host = "h2"; }
        }
        script "deploy" {
            start cmd "web" wait "running";
            stop group "svc" wait "stopped";
        }
    "#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(src.as_bytes()).unwrap();

    let (bus, _handle) = InMemoryBus::new();
    let mut sheriff = Sheriff::new();
    let loaded = sheriff::config::parse(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
    sheriff.load_config(&bus, &loaded).await.unwrap();

    let saved = sheriff.save_config();
    let mut reloaded_file = tempfile::NamedTempFile::new().unwrap();
    reloaded_file.write_all(saved.to_string().as_bytes()).unwrap();
    let reparsed =
        sheriff::config::parse(&std::fs::read_to_string(reloaded_file.path()).unwrap()).unwrap();

    assert_eq!(saved.groups.len(), reparsed.groups.len());
    for (a, b) in saved.groups.iter().zip(reparsed.groups.iter()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.commands, b.commands);
    }

    let names: Vec<&str> = sheriff.all_commands().iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"/bin/web"));
    assert!(names.contains(&"/bin/side"));
}
