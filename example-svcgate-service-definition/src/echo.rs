use svcgate_service::{Many, Single, service};

service! {
    /// Reflects requests back to the caller.
    pub service Echo => EchoClient = "echo" {
        /// Replies with `message` unchanged.
        fn echo(message: String) -> Single<String>;

        /// Streams `1..=count`, then completes.
        fn tail(count: u32) -> Many<i64>;

        fn notify(event: String);
    }
}
