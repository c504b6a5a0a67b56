use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat,
    PathArguments, Signature, Type,
};

/// Which backing store the test runs against.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// A fresh in-memory store behind a local Rocket client.
    Memory,
    /// The in-memory store, with the client logged in as a voter.
    Voter,
    /// A freshly created MongoDB database, dropped afterwards.
    Mongo,
}

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// By default, and with `#[backend_test(voter)]`, a server is built over a
/// fresh in-memory store. Injectable dependencies are
/// [`rocket::local::asynchronous::Client`], `crate::model::store::MemoryStore`
/// (the server's storage), and `crate::audit::AuditTrail` (everything the
/// server has audited). `voter` logs the client in as
/// `UserCredentials::example()` before the test body runs.
///
/// `#[backend_test(mongo)]` instead creates a uniquely named database on the
/// MongoDB server at the configured `db_uri`, brings it up to schema, and
/// drops it regardless of how the test terminates. Injectable dependencies
/// are `crate::model::store::MongoStore`, [`mongodb::Database`],
/// `crate::model::mongodb::Coll<T>` and `crate::audit::AuditTrail`. These
/// tests are ignored unless requested with `cargo test -- --ignored`.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    let mode = match parse_macro_input!(args as Option<Ident>) {
        None => Mode::Memory,
        Some(arg) if arg == "voter" => Mode::Voter,
        Some(arg) if arg == "mongo" => Mode::Mongo,
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument, `voter` or `mongo`")
                .into_compile_error()
                .into();
        }
    };

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone(), mode) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    match mode {
        Mode::Memory | Mode::Voter => memory_test(name, new_name, item_fn, test_args, mode),
        Mode::Mongo => mongo_test(name, new_name, item_fn, test_args),
    }
    .into()
}

/// Rewrite a test that runs against the in-memory store.
fn memory_test(
    name: Ident,
    new_name: Ident,
    item_fn: ItemFn,
    test_args: Vec<TokenStream2>,
    mode: Mode,
) -> TokenStream2 {
    // Log in the client as a voter if needed.
    let maybe_login = if mode == Mode::Voter {
        quote! {
            store.insert_user(
                crate::model::db::NewUser::try_from(
                    crate::model::api::auth::UserCredentials::example(),
                )
                .unwrap(),
            );

            {
                let response = rocket_client
                    .post("/auth/login")
                    .header(rocket::http::ContentType::JSON)
                    .body(rocket::serde::json::json!(crate::model::api::auth::UserCredentials::example()).to_string())
                    .dispatch()
                    .await;
                assert_eq!(rocket::http::Status::Ok, response.status(), "voter login failed");
            }
        }
    } else {
        quote! {}
    };

    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup(
                store: crate::model::store::MemoryStore,
                audit: crate::audit::AuditTrail,
            ) -> rocket::local::asynchronous::Client {
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_store(store.clone(), audit),
                )
                .await
                .unwrap();

                #maybe_login

                rocket_client
            }

            /// The test itself.
            #item_fn

            // This test actually enters backend code, so enable logging.
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["polls_backend"],
                None,
                None,
            );

            let store = crate::model::store::MemoryStore::default();
            let audit = crate::audit::AuditTrail::default();

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let rocket_client = setup(store.clone(), audit.clone()).await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
}

/// Rewrite a test that runs against a throwaway MongoDB database.
fn mongo_test(
    name: Ident,
    new_name: Ident,
    item_fn: ItemFn,
    test_args: Vec<TokenStream2>,
) -> TokenStream2 {
    quote! {
        #[test]
        #[ignore = "needs a MongoDB server at the configured `db_uri`"]
        fn #name() {
            /// Test setup.
            async fn setup() -> ::mongodb::Database {
                let db_uri = rocket::Config::figment()
                    .extract_inner::<String>("db_uri")
                    .expect("`db_uri` not set");
                let db_client = ::mongodb::Client::with_uri_str(&db_uri).await.unwrap();
                let db_name = format!("polls_test_{}", crate::model::mongodb::Id::new());
                let db = db_client.database(&db_name);
                crate::config::prepare_database(&db).await.unwrap();
                db
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(db: ::mongodb::Database) {
                db.drop(None).await.unwrap();
            }

            // This test actually enters backend code, so enable logging.
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["polls_backend"],
                None,
                None,
            );

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("mongo-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let db = outer_runtime.block_on(setup());

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let db_mutex = std::sync::Mutex::new(db.clone());
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                #[allow(unused_variables)]
                let db = db_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();
                #[allow(unused_variables)]
                let audit = crate::audit::AuditTrail::default();

                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
}

/// Ensure the wrapped test is async, map its parameters to injected values,
/// and reject parameters the mode cannot supply.
fn check_sig(sig: Signature, mode: Mode) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen: Vec<String> = vec![];
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(segment) = type_path.path.segments.last() {
                    let type_name = segment.ident.to_string();

                    // Collections may be injected more than once, for different `T`.
                    if mode == Mode::Mongo && type_name == "Coll" {
                        if let PathArguments::AngleBracketed(generics) = &segment.arguments {
                            if let Some(GenericArgument::Type(coll_type)) = generics.args.first() {
                                args.push(quote! {
                                    crate::model::mongodb::Coll::<#coll_type>::from_db(&db)
                                });
                                continue;
                            }
                        }
                    }

                    let injected = match (mode, type_name.as_str()) {
                        (Mode::Memory | Mode::Voter, "Client") => Some(quote! { rocket_client }),
                        (Mode::Memory | Mode::Voter, "MemoryStore") => {
                            Some(quote! { store.clone() })
                        }
                        (Mode::Mongo, "MongoStore") => {
                            Some(quote! { crate::model::store::MongoStore::new(&db) })
                        }
                        (Mode::Mongo, "Database") => Some(quote! { db.clone() }),
                        (_, "AuditTrail") => Some(quote! { audit.clone() }),
                        _ => None,
                    };
                    if let Some(injected) = injected {
                        if seen.contains(&type_name) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_name}`"),
                            ));
                        }
                        seen.push(type_name);
                        args.push(injected);
                        continue;
                    }
                }
            }
        }

        let expected = match mode {
            Mode::Memory | Mode::Voter => {
                "Expected one of `client_ident: Client`, `store_ident: MemoryStore` or `audit_ident: AuditTrail`"
            }
            Mode::Mongo => {
                "Expected one of `store_ident: MongoStore`, `db_ident: Database`, `collection_ident: Coll<T>` or `audit_ident: AuditTrail`"
            }
        };
        return Err(syn::Error::new(input.span(), expected));
    }

    Ok(args)
}
