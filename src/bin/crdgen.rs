//! CRD YAML Generator
//!
//! Prints the CustomResourceDefinition manifests for the resources served
//! by the scribe-mover-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use scribe_mover_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
