use svcgate_service::{Single, service};

service! {
    pub service Math => MathClient = "math" {
        fn add(a: f64, b: f64) -> Single<f64> = "math/sum";
        fn ping() -> Single<String>;
    }
}
