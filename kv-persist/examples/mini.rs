use kv_persist::{Config, Dao, DataAccess, Db, Error, Params};

#[derive(kv_persist::Entity, Clone, PartialEq, ::prost::Message)]
pub struct Account {
    #[entity(id)]
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,

    #[entity(version)]
    #[prost(uint64, tag = "2")]
    pub version: u64,

    #[prost(string, tag = "3")]
    pub email: ::prost::alloc::string::String,
}

#[derive(kv_persist::Entity, Clone, PartialEq, ::prost::Message)]
#[entity(getter(display_name = String))]
pub struct UserInfo {
    #[entity(id)]
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,

    #[entity(version)]
    #[prost(uint64, tag = "2")]
    pub version: u64,

    #[prost(string, tag = "3")]
    pub name: ::prost::alloc::string::String,

    #[prost(int32, tag = "4")]
    pub age: i32,

    #[entity(base)]
    #[prost(message, optional, tag = "5")]
    pub account: Option<Account>,
}

impl UserInfo {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            String::new()
        } else {
            format!("{} <{}>", self.name, self.age)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let db = Db::connect(Config::from_env()?).await?;
    let users = Dao::<UserInfo, _>::new(&db);
    println!("{}", users);

    users.delete_all().await?;

    let mut alice = UserInfo {
        id: "1".to_string(),
        name: "Alice".to_string(),
        age: 25,
        account: Some(Account {
            id: "1".to_string(),
            email: "alice@example.com".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    users.save(&mut alice).await?;
    users.commit().await?;

    let sample = UserInfo {
        account: Some(Account {
            email: "example.com".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let found = users.find_by_example(&sample, &[]).await?;
    println!("{:?}", found);

    let prefix = format!("entity/{}/", users.type_path());
    let rows = users
        .find_with(
            &format!("{}:id", prefix),
            &Params::from([("id".to_string(), "1".into())]),
        )
        .await?;
    for row in rows {
        println!("{} => {:?}", row.key, row.decode::<UserInfo>()?);
    }

    users.delete(&alice).await?;
    users.close_session().await?;

    Ok(())
}
