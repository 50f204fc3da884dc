use rdkafka::metadata::MetadataBroker;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Broker {
    pub id: u32,
    pub host: String,
    pub port: u16,
}

impl Broker {
    /// Network address of the Broker, in the `HOST:PORT` format.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&MetadataBroker> for Broker {
    fn from(b: &MetadataBroker) -> Self {
        Broker {
            id: b.id() as u32,
            host: b.host().to_owned(),
            port: b.port() as u16,
        }
    }
}
