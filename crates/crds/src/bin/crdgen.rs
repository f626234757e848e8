//! Prints the Team CustomResourceDefinition as YAML.
//!
//! `cargo run -p crds --bin crdgen > config/crd/team.yaml`

use crds::Team;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Team::crd())?);
    Ok(())
}
