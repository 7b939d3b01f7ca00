use controller::api::v1alpha1::Cassandra;
use kube::CustomResourceExt;

fn main() {
    print!("{}", serde_yaml::to_string(&Cassandra::crd()).unwrap())
}
